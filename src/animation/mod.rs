//! 动画系统
//!
//! - vmd_loader / bvh_loader: 两种源格式的编解码
//! - bezier_curve: 关键帧缓动曲线
//! - keyframe / motion_track: 关键帧与轨道采样
//! - clip / player: 动画片段与混合播放

mod bezier_curve;
mod bvh_loader;
mod clip;
mod keyframe;
mod motion_track;
mod player;
mod vmd_loader;

pub use bezier_curve::{BezierCurve, Curve};
pub use bvh_loader::BvhFile;
pub use clip::{AnimationClip, IkSwitchTrack};
pub use keyframe::{BoneKeyframe, Interpolation, Keyframe, KeyframeValue};
pub use motion_track::{AnimationTrack, KeyframeTrack, MotionTrack, TrackData, TrackProperty, TrackValue};
pub use player::{AnimationAction, AnimationMixer, LoopMode};
pub use vmd_loader::{
    VmdBoneKey, VmdCameraCurves, VmdCameraKey, VmdCounts, VmdFile, VmdHeader, VmdIkKey, VmdIkState,
    VmdLayout, VmdMorphKey, VmdSection,
};
