//! 动画片段

use super::motion_track::{AnimationTrack, TrackProperty};

/// IK 开关轨道（来自 VMD 的 IK 记录）
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IkSwitchTrack {
    /// IK 目标骨骼的规范名称
    pub name: String,
    pub times: Vec<f32>,
    pub enabled: Vec<bool>,
    pub shown: Vec<bool>,
}

impl IkSwitchTrack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, time: f32, enabled: bool, shown: bool) {
        self.times.push(time);
        self.enabled.push(enabled);
        self.shown.push(shown);
    }

    /// 第一帧的开关状态（整段动作共用）
    pub fn enabled_at_start(&self) -> Option<bool> {
        self.enabled.first().copied()
    }
}

/// 动画片段
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnimationClip {
    pub name: String,
    pub tracks: Vec<AnimationTrack>,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tracks: Vec::new(),
        }
    }

    pub fn with_tracks(name: impl Into<String>, tracks: Vec<AnimationTrack>) -> Self {
        Self {
            name: name.into(),
            tracks,
        }
    }

    pub fn push(&mut self, track: AnimationTrack) {
        self.tracks.push(track);
    }

    /// 片段时长（最长轨道）
    pub fn duration(&self) -> f32 {
        self.tracks
            .iter()
            .map(AnimationTrack::duration)
            .fold(0.0, f32::max)
    }

    /// 按名称查找轨道，如 `Hips.quaternion`
    pub fn get_track(&self, name: &str) -> Option<&AnimationTrack> {
        self.tracks.iter().find(|t| t.is_named(name))
    }

    pub fn find(&self, target: &str, property: TrackProperty) -> Option<&AnimationTrack> {
        self.tracks
            .iter()
            .find(|t| t.property == property && t.target == target)
    }

    /// 移除某个目标的全部轨道
    pub fn remove_target(&mut self, target: &str) {
        self.tracks.retain(|t| t.target != target);
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn track_names(&self) -> Vec<String> {
        self.tracks.iter().map(AnimationTrack::name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{Interpolation, Keyframe, KeyframeTrack};
    use glam::{Quat, Vec3};

    #[test]
    fn test_clip_lookup() {
        let mut position = KeyframeTrack::new(Interpolation::Linear);
        position.insert(Keyframe::new(0.0, Vec3::ZERO));
        position.insert(Keyframe::new(2.0, Vec3::Y));
        let mut rotation = KeyframeTrack::new(Interpolation::Linear);
        rotation.insert(Keyframe::new(0.5, Quat::IDENTITY));

        let mut clip = AnimationClip::with_tracks(
            "walk",
            vec![
                AnimationTrack::position("Center", position),
                AnimationTrack::rotation("Hips", rotation),
            ],
        );
        assert_eq!(clip.duration(), 2.0);
        assert!(clip.get_track("Hips.quaternion").is_some());
        assert!(clip.find("Center", TrackProperty::Rotation).is_none());
        assert_eq!(clip.track_names(), vec!["Center.position", "Hips.quaternion"]);

        clip.remove_target("Center");
        assert_eq!(clip.duration(), 0.5);
    }

    #[test]
    fn test_ik_switch_first_record() {
        let mut switch = IkSwitchTrack::new("LeftFootIK");
        assert_eq!(switch.enabled_at_start(), None);
        switch.push(0.0, false, true);
        switch.push(1.0, true, true);
        assert_eq!(switch.enabled_at_start(), Some(false));
    }
}
