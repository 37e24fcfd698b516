//! 重定向
//!
//! 把规范化的源动作绑定到目标骨骼：
//! - 旋转轨道改写到目标骨骼名称
//! - 根类骨骼与 IK 目标的平移按髋部高度比例缩放
//! - 髋部平移由 Center 承载，旋转仍作用于髋部
//! - 相机位置按固定比例缩放并抬高

use std::collections::BTreeMap;

use glam::Vec3;

use crate::animation::{AnimationClip, AnimationTrack, TrackData, TrackProperty};
use crate::config::RetargetConfig;
use crate::skeleton::{
    add_extra_rig, add_ik_rig, BoneSet, CcdSolver, HumanoidMap, IkChain, IkOffsets, RigOffsets,
};
use crate::{Result, RetargetWarning};

use super::bone_role::{translation_rule, TranslationRule};
use super::source_motion::SourceMotion;

// ============================================================================
// 目标骨骼
// ============================================================================

/// 补齐附加骨骼与 IK 骨骼后的目标骨骼
#[derive(Debug, Clone)]
pub struct TargetRig {
    pub skeleton: BoneSet,
    /// 规范骨骼名 -> 目标骨骼名
    pub names: HumanoidMap,
    /// 规范表情名 -> 目标表情名
    pub morph_names: HumanoidMap,
    /// 修改骨骼树之前的静止偏移
    pub offsets: RigOffsets,
    pub ik_offsets: IkOffsets,
    /// 目标骨骼上可用的 IK 链
    pub chains: Vec<IkChain>,
}

impl TargetRig {
    /// 计算静止偏移，再依次添加附加骨骼与 IK 骨骼
    pub fn new(mut skeleton: BoneSet, names: HumanoidMap, config: &RetargetConfig) -> Result<Self> {
        let offsets = RigOffsets::from_skeleton(&skeleton, &names)?;
        if !add_extra_rig(&mut skeleton, &names, &offsets)? {
            log::debug!("Target skeleton already has an extra rig");
        }
        let ik_offsets = add_ik_rig(&mut skeleton, &names)?;

        let chains: Vec<IkChain> = IkChain::default_leg_chains(config)
            .into_iter()
            .filter(|chain| {
                let bound = CcdSolver::bind(chain.clone(), &skeleton, &names).is_ok();
                if !bound {
                    log::warn!("IK chain {} has missing bones, skipped", chain.target);
                }
                bound
            })
            .collect();

        log::info!(
            "Target rig ready: {} bones, {} IK chains, hip height {:.4}",
            skeleton.len(),
            chains.len(),
            offsets.hips.y
        );

        Ok(Self {
            skeleton,
            names,
            morph_names: HumanoidMap::new(),
            offsets,
            ik_offsets,
            chains,
        })
    }

    pub fn with_morph_names(mut self, morph_names: HumanoidMap) -> Self {
        self.morph_names = morph_names;
        self
    }

    /// 目标髋部高度
    #[inline]
    pub fn hip_height(&self) -> f32 {
        self.offsets.hips.y
    }

    /// 规范名称对应的目标骨骼名称（骨骼存在时）
    pub fn bone_name<'a>(&'a self, canonical: &'a str) -> Option<&'a str> {
        let name = self.names.resolve(canonical);
        self.skeleton.find(name).map(|_| name)
    }

    /// 为每条 IK 链绑定求解器
    pub fn bind_solvers(&self) -> Result<Vec<CcdSolver>> {
        self.chains
            .iter()
            .map(|chain| CcdSolver::bind(chain.clone(), &self.skeleton, &self.names))
            .collect()
    }
}

// ============================================================================
// 重定向结果
// ============================================================================

/// 绑定到目标骨骼的动作
#[derive(Debug, Clone, PartialEq)]
pub struct RetargetedClip {
    /// 骨骼与表情轨道
    pub clip: AnimationClip,
    pub camera: Option<AnimationClip>,
    /// IK 目标 -> 整段动作的开关
    pub ik_enabled: BTreeMap<String, bool>,
    /// 平移缩放比例
    pub scale: f32,
    pub warnings: Vec<RetargetWarning>,
}

impl RetargetedClip {
    pub fn get_track(&self, name: &str) -> Option<&AnimationTrack> {
        self.clip.get_track(name)
    }

    pub fn ik_enabled(&self, target: &str) -> bool {
        self.ik_enabled.get(target).copied().unwrap_or(false)
    }
}

// ============================================================================
// 重定向器
// ============================================================================

/// 重定向器
#[derive(Debug, Clone, Default)]
pub struct Retargeter {
    config: RetargetConfig,
}

impl Retargeter {
    pub fn new(config: RetargetConfig) -> Self {
        Self { config }
    }

    /// 平移比例：目标髋部高度 / 源髋部高度
    ///
    /// 源高度接近 0 时按 1 处理并返回警告。
    pub fn scale_factor(&self, source: &SourceMotion, rig: &TargetRig) -> (f32, Option<RetargetWarning>) {
        if source.hip_height.abs() < self.config.min_hip_height {
            let warning = RetargetWarning::DegenerateHipHeight {
                height: source.hip_height,
            }
            .logged();
            return (1.0, Some(warning));
        }
        (rig.hip_height() / source.hip_height, None)
    }

    pub fn retarget(&self, source: &SourceMotion, rig: &TargetRig) -> RetargetedClip {
        let mut warnings = source.warnings.clone();
        let (scale, warning) = self.scale_factor(source, rig);
        warnings.extend(warning);

        let mut clip = AnimationClip::new(source.name.as_str());
        for track in &source.clip.tracks {
            match track.property {
                TrackProperty::Rotation => {
                    if track.is_degenerate() {
                        continue;
                    }
                    match rig.bone_name(&track.target) {
                        Some(target) => clip.push(renamed(track, target)),
                        None => log::debug!("No target bone for '{}', rotation dropped", track.target),
                    }
                }
                TrackProperty::Position => {
                    let Some(target) = self.translation_target(source, rig, &track.target) else {
                        continue;
                    };
                    let mut track = renamed(track, target);
                    if let Some(values) = track.as_vector_mut() {
                        values.scale(scale);
                    }
                    clip.push(track);
                }
                TrackProperty::Weight | TrackProperty::Fov => {}
            }
        }

        if let Some(morphs) = &source.morphs {
            for track in &morphs.tracks {
                if track.property == TrackProperty::Weight {
                    clip.push(renamed(track, rig.morph_names.resolve(&track.target)));
                }
            }
        }

        let camera = source.camera.as_ref().map(|camera| self.camera_clip(camera));
        let ik_enabled = Self::ik_states(source, rig);

        log::info!(
            "Retargeted '{}': {} tracks, scale {:.4}, IK {:?}",
            source.name,
            clip.tracks.len(),
            scale,
            ik_enabled
        );

        RetargetedClip {
            clip,
            camera,
            ik_enabled,
            scale,
            warnings,
        }
    }

    /// 平移轨道的目标骨骼，不需要时返回 None
    fn translation_target<'a>(&self, source: &SourceMotion, rig: &'a TargetRig, canonical: &'a str) -> Option<&'a str> {
        match translation_rule(canonical) {
            TranslationRule::Ignore => None,
            TranslationRule::Scaled => rig.bone_name(canonical),
            TranslationRule::Carried(carrier) => {
                if source.clip.find(carrier, TrackProperty::Position).is_some() {
                    // 源动作自身驱动承载骨骼
                    return None;
                }
                rig.bone_name(carrier).or_else(|| rig.bone_name(canonical))
            }
        }
    }

    /// 相机位置缩放并抬高
    fn camera_clip(&self, camera: &AnimationClip) -> AnimationClip {
        let scale = self.config.camera_position_scale;
        let lift = Vec3::new(0.0, self.config.camera_height_offset, 0.0);
        let mut camera = camera.clone();
        for track in &mut camera.tracks {
            if let TrackData::Vector(values) = &mut track.data {
                values.map_values(|v| v * scale + lift);
            }
        }
        camera
    }

    /// 整段动作的 IK 开关，取第一帧
    ///
    /// 动作没有 IK 数据时全部关闭。
    fn ik_states(source: &SourceMotion, rig: &TargetRig) -> BTreeMap<String, bool> {
        rig.chains
            .iter()
            .map(|chain| {
                let enabled = source
                    .ik_switch(&chain.target)
                    .and_then(|t| t.enabled_at_start())
                    .unwrap_or(false);
                (chain.target.clone(), enabled)
            })
            .collect()
    }
}

/// 复制轨道并改写目标名称
fn renamed(track: &AnimationTrack, target: &str) -> AnimationTrack {
    AnimationTrack {
        target: target.to_string(),
        ..track.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{IkSwitchTrack, Interpolation, Keyframe, KeyframeTrack, MotionTrack};
    use crate::retarget::SourceKind;
    use crate::skeleton::BoneFlags;
    use glam::Quat;

    /// 髋部高度 25.56 的目标骨骼，骨骼名称带前缀
    fn target_rig() -> TargetRig {
        let mut s = BoneSet::new();
        let e = BoneFlags::empty();
        s.add("J_Hips", None, Vec3::new(0.0, 25.56, 0.0), e).unwrap();
        s.add("J_Spine", Some("J_Hips"), Vec3::new(0.0, 2.0, 0.0), e).unwrap();
        let mut names = HumanoidMap::new();
        names.insert("Hips", "J_Hips");
        names.insert("Spine", "J_Spine");
        for (side, x) in [("Left", 2.0), ("Right", -2.0)] {
            let upper = format!("J_{side}UpperLeg");
            let lower = format!("J_{side}LowerLeg");
            let foot = format!("J_{side}Foot");
            let toes = format!("J_{side}Toes");
            s.add(&upper, Some("J_Hips"), Vec3::new(x, -1.0, 0.0), e).unwrap();
            s.add(&lower, Some(&upper), Vec3::new(0.0, -12.0, 0.0), e).unwrap();
            s.add(&foot, Some(&lower), Vec3::new(0.0, -11.0, 0.0), e).unwrap();
            s.add(&toes, Some(&foot), Vec3::new(0.0, -1.0, 2.0), e).unwrap();
            for canonical in ["UpperLeg", "LowerLeg", "Foot", "Toes"] {
                names.insert(format!("{side}{canonical}"), format!("J_{side}{canonical}"));
            }
        }
        TargetRig::new(s, names, &RetargetConfig::default()).unwrap()
    }

    fn source(hip_height: f32, tracks: Vec<AnimationTrack>) -> SourceMotion {
        SourceMotion {
            name: "clip".to_string(),
            kind: SourceKind::Bvh,
            clip: AnimationClip::with_tracks("clip", tracks),
            morphs: None,
            camera: None,
            ik_switches: Vec::new(),
            skeleton: None,
            hip_height,
            warnings: Vec::new(),
        }
    }

    fn vector(value: Vec3) -> KeyframeTrack<Vec3> {
        let mut track = KeyframeTrack::new(Interpolation::Linear);
        track.insert(Keyframe::new(0.0, value));
        track
    }

    fn rotation(value: Quat) -> KeyframeTrack<Quat> {
        let mut track = KeyframeTrack::new(Interpolation::Linear);
        track.insert(Keyframe::new(0.0, value));
        track
    }

    #[test]
    fn test_target_rig() {
        let rig = target_rig();
        assert_eq!(rig.hip_height(), 25.56);
        assert_eq!(rig.chains.len(), 4);
        assert_eq!(rig.bind_solvers().unwrap().len(), 4);
        assert_eq!(rig.bone_name("Hips"), Some("J_Hips"));
        assert_eq!(rig.bone_name("Center"), Some("Center"));
        assert_eq!(rig.bone_name("Tail"), None);
        assert_eq!(rig.ik_offsets.len(), 6);
    }

    #[test]
    fn test_proportion_scaling() {
        let rig = target_rig();
        let motion = source(12.78, vec![AnimationTrack::position("Hips", vector(Vec3::new(0.0, 5.0, 0.0)))]);
        let result = Retargeter::default().retarget(&motion, &rig);
        assert!((result.scale - 2.0).abs() < 1e-6);

        // 髋部平移由 Center 承载
        assert!(result.get_track("J_Hips.position").is_none());
        let center = result.get_track("Center.position").unwrap().as_vector().unwrap();
        assert!(center.sample(0.0).abs_diff_eq(Vec3::new(0.0, 10.0, 0.0), 1e-5));
    }

    #[test]
    fn test_rotation_split_and_unscaled() {
        let rig = target_rig();
        let q = Quat::from_rotation_y(0.5);
        let motion = source(
            12.78,
            vec![
                AnimationTrack::rotation("Hips", rotation(q)),
                AnimationTrack::rotation("Spine", rotation(Quat::IDENTITY)),
                AnimationTrack::rotation("Tail", rotation(q)),
                AnimationTrack::position("Spine", vector(Vec3::ONE)),
                AnimationTrack::position("Center", vector(Vec3::new(0.0, 12.78, 0.0))),
                AnimationTrack::position("Hips", vector(Vec3::ONE)),
            ],
        );
        let result = Retargeter::default().retarget(&motion, &rig);
        let hips = result.get_track("J_Hips.quaternion").unwrap().as_rotation().unwrap();
        assert_eq!(hips.sample(0.0), q);
        // 恒等旋转轨道退化被丢弃，未知骨骼被丢弃，普通骨骼平移被丢弃
        assert!(result.get_track("J_Spine.quaternion").is_none());
        assert!(result.get_track("Tail.quaternion").is_none());
        assert!(result.get_track("J_Spine.position").is_none());
        // 源动作有 Center 平移时髋部平移被丢弃
        assert_eq!(result.clip.tracks.len(), 2);
        let center = result.get_track("Center.position").unwrap().as_vector().unwrap();
        assert!(center.sample(0.0).abs_diff_eq(Vec3::new(0.0, 25.56, 0.0), 1e-4));
    }

    #[test]
    fn test_degenerate_hip_height() {
        let rig = target_rig();
        let motion = source(0.0, vec![AnimationTrack::position("RightFootIK", vector(Vec3::ONE))]);
        let result = Retargeter::default().retarget(&motion, &rig);
        assert_eq!(result.scale, 1.0);
        assert!(matches!(result.warnings[0], RetargetWarning::DegenerateHipHeight { .. }));
        let ik = result.get_track("RightFootIK.position").unwrap().as_vector().unwrap();
        assert_eq!(ik.sample(0.0), Vec3::ONE);
    }

    #[test]
    fn test_ik_states_from_first_frame() {
        let rig = target_rig();
        let mut motion = source(12.78, Vec::new());
        let result = Retargeter::default().retarget(&motion, &rig);
        assert!(result.ik_enabled.values().all(|e| !e));

        let mut switch = IkSwitchTrack::new("LeftFootIK");
        switch.push(0.0, true, true);
        switch.push(1.0, false, true);
        motion.ik_switches.push(switch);
        let result = Retargeter::default().retarget(&motion, &rig);
        assert!(result.ik_enabled("LeftFootIK"));
        assert!(!result.ik_enabled("RightFootIK"));
    }

    #[test]
    fn test_camera_and_morphs() {
        let rig = target_rig();
        let mut motion = source(12.78, Vec::new());
        motion.camera = Some(AnimationClip::with_tracks(
            "camera",
            vec![AnimationTrack::position("camera", vector(Vec3::new(10.0, 10.0, -50.0)))],
        ));
        let mut weight = KeyframeTrack::new(Interpolation::Linear);
        weight.insert(Keyframe::new(0.0, 1.0_f32));
        motion.morphs = Some(AnimationClip::with_tracks("morphs", vec![AnimationTrack::weight("Blink", weight)]));

        let mut morph_names = HumanoidMap::new();
        morph_names.insert("Blink", "Fcl_EYE_Close");
        let rig = rig.with_morph_names(morph_names);
        let result = Retargeter::default().retarget(&motion, &rig);

        let camera = result.camera.as_ref().unwrap();
        let position = camera.get_track("camera.position").unwrap().as_vector().unwrap();
        assert!(position.sample(0.0).abs_diff_eq(Vec3::new(0.8, 1.0, -4.0), 1e-5));
        assert!(result.get_track("Fcl_EYE_Close.weight").is_some());
    }
}
