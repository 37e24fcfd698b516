//! 角色
//!
//! 持有目标骨骼、姿态、混合器与 IK 求解器，每帧由 `update` 驱动：
//! 表情播放器 -> 姿态复位 -> 轨道采样 -> 世界矩阵 -> CCD -> 相机

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use glam::{Quat, Vec3};

use crate::animation::{AnimationMixer, AnimationTrack, LoopMode, TrackValue};
use crate::config::RetargetConfig;
use crate::morph::MorphPlayer;
use crate::retarget::{RetargetedClip, Retargeter, SourceMotion, TargetRig, CAMERA, CAMERA_TARGET};
use crate::skeleton::{CcdSolver, Pose, SolveReport};
use crate::Result;

/// 相机状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    pub target: Vec3,
    pub rotation: Quat,
    /// 视角（度）
    pub fov: f32,
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            target: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fov: 30.0,
        }
    }
}

/// 角色
pub struct Actor {
    rig: TargetRig,
    pose: Pose,
    mixer: AnimationMixer,
    retargeter: Retargeter,
    clips: HashMap<String, RetargetedClip>,
    solvers: Vec<CcdSolver>,
    expressions: BTreeMap<String, MorphPlayer>,
    camera: Option<CameraPose>,
    reports: Vec<SolveReport>,
    config: RetargetConfig,
}

impl Actor {
    pub fn new(rig: TargetRig, config: RetargetConfig) -> Result<Self> {
        let solvers = rig.bind_solvers()?;
        let pose = Pose::rest(&rig.skeleton);
        Ok(Self {
            rig,
            pose,
            mixer: AnimationMixer::new(),
            retargeter: Retargeter::new(config.clone()),
            clips: HashMap::new(),
            solvers,
            expressions: BTreeMap::new(),
            camera: None,
            reports: Vec::new(),
            config,
        })
    }

    #[inline]
    pub fn rig(&self) -> &TargetRig {
        &self.rig
    }

    #[inline]
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    #[inline]
    pub fn mixer(&self) -> &AnimationMixer {
        &self.mixer
    }

    /// 当前相机（当前动作带相机轨道时）
    #[inline]
    pub fn camera(&self) -> Option<&CameraPose> {
        self.camera.as_ref()
    }

    /// 上一帧各 IK 链的求解统计
    pub fn solve_reports(&self) -> &[SolveReport] {
        &self.reports
    }

    pub fn clip(&self, id: &str) -> Option<&RetargetedClip> {
        self.clips.get(id)
    }

    // ========================================================================
    // 动作
    // ========================================================================

    /// 重定向源动作并加入混合器，动作 ID 为源动作名称
    pub fn load(&mut self, source: &SourceMotion, loop_mode: LoopMode) -> &RetargetedClip {
        let clip = self.retargeter.retarget(source, &self.rig);
        self.add_clip(source.name.clone(), clip, loop_mode)
    }

    /// 加入已重定向的动作，同 ID 的旧动作被替换
    pub fn add_clip(&mut self, id: String, mut clip: RetargetedClip, loop_mode: LoopMode) -> &RetargetedClip {
        clip.clip.name = id.clone();
        self.mixer
            .add_clip(Arc::new(clip.clip.clone()), &self.rig.skeleton, loop_mode);
        self.clips.insert(id.clone(), clip);
        &self.clips[&id]
    }

    /// 播放动作并按动作第一帧设置 IK 开关
    pub fn play(&mut self, id: &str) -> bool {
        if !self.mixer.play(id, self.config.crossfade_seconds) {
            return false;
        }
        self.apply_ik_states(id);
        true
    }

    pub fn pause(&mut self, id: &str) -> bool {
        self.mixer.pause(id)
    }

    fn apply_ik_states(&mut self, id: &str) {
        let Some(clip) = self.clips.get(id) else {
            return;
        };
        for solver in &mut self.solvers {
            solver.set_enabled(clip.ik_enabled(solver.target_name()));
        }
        log::debug!(
            "IK for '{}': {}",
            id,
            if self.is_ik_enabled() { "enabled" } else { "disabled" }
        );
    }

    /// 当前动作中的轨道，如 `J_Hips.quaternion`
    pub fn get_track(&self, name: &str) -> Option<&AnimationTrack> {
        let current = self.mixer.current()?;
        self.clips.get(current.name())?.get_track(name)
    }

    /// 手动开关某条 IK 链，返回是否找到
    pub fn set_chain_enabled(&mut self, target: &str, enabled: bool) -> bool {
        match self.solvers.iter_mut().find(|s| s.target_name() == target) {
            Some(solver) => {
                solver.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    pub fn is_ik_enabled(&self) -> bool {
        self.solvers.iter().any(CcdSolver::is_enabled)
    }

    // ========================================================================
    // 表情
    // ========================================================================

    /// 淡入表情，`duration` 为保持时间
    pub fn start_expression(&mut self, name: &str, value: f32, duration: Option<f32>) {
        let transition = self.config.morph_transition_seconds;
        self.expressions
            .entry(name.to_string())
            .or_insert_with(|| MorphPlayer::new(name, transition))
            .start(value, duration);
    }

    pub fn end_expression(&mut self, name: &str) {
        if let Some(player) = self.expressions.get_mut(name) {
            player.end();
        }
    }

    // ========================================================================
    // 每帧更新
    // ========================================================================

    pub fn update(&mut self, dt: f32) {
        for player in self.expressions.values_mut() {
            player.apply(dt, &mut self.pose);
        }

        self.pose.reset(&self.rig.skeleton);
        let finished = self.mixer.update(dt);
        for name in finished {
            log::debug!("Animation '{}' finished", name);
        }
        self.mixer.sample_into(&mut self.pose);
        self.pose.update_world(&self.rig.skeleton);

        self.reports.clear();
        if self.is_ik_enabled() {
            for solver in &self.solvers {
                let report = solver.solve(&self.rig.skeleton, &mut self.pose);
                self.reports.push(report);
            }
        }

        self.camera = self.sample_camera();
    }

    fn sample_camera(&self) -> Option<CameraPose> {
        let action = self.mixer.current()?;
        let camera = self.clips.get(action.name())?.camera.as_ref()?;

        let mut pose = self.camera.unwrap_or_default();
        for track in &camera.tracks {
            match (track.target.as_str(), track.sample(action.time)) {
                (CAMERA, TrackValue::Vector(v)) => pose.position = v,
                (CAMERA, TrackValue::Rotation(q)) => pose.rotation = q,
                (CAMERA, TrackValue::Scalar(fov)) => pose.fov = fov,
                (CAMERA_TARGET, TrackValue::Vector(v)) => pose.target = v,
                _ => {}
            }
        }
        Some(pose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{AnimationClip, IkSwitchTrack, Interpolation, Keyframe, KeyframeTrack};
    use crate::retarget::SourceKind;
    use crate::skeleton::{BoneFlags, BoneSet, HumanoidMap};

    fn rig() -> TargetRig {
        let mut s = BoneSet::new();
        let e = BoneFlags::empty();
        s.add("Hips", None, Vec3::new(0.0, 25.56, 0.0), e).unwrap();
        for (side, x) in [("Left", 2.0), ("Right", -2.0)] {
            let upper = format!("{side}UpperLeg");
            let lower = format!("{side}LowerLeg");
            let foot = format!("{side}Foot");
            s.add(&upper, Some("Hips"), Vec3::new(x, -1.0, 0.0), e).unwrap();
            s.add(&lower, Some(&upper), Vec3::new(0.0, -12.0, 0.0), e).unwrap();
            s.add(&foot, Some(&lower), Vec3::new(0.0, -11.0, 0.0), e).unwrap();
            s.add(&format!("{side}Toes"), Some(&foot), Vec3::new(0.0, -1.0, 2.0), e).unwrap();
        }
        TargetRig::new(s, HumanoidMap::new(), &RetargetConfig::default()).unwrap()
    }

    fn motion(name: &str, tracks: Vec<AnimationTrack>) -> SourceMotion {
        SourceMotion {
            name: name.to_string(),
            kind: SourceKind::Vmd,
            clip: AnimationClip::with_tracks(name, tracks),
            morphs: None,
            camera: None,
            ik_switches: Vec::new(),
            skeleton: None,
            hip_height: 25.56,
            warnings: Vec::new(),
        }
    }

    fn linear<T: crate::animation::KeyframeValue>(keys: &[(f32, T)]) -> KeyframeTrack<T> {
        let mut track = KeyframeTrack::new(Interpolation::Linear);
        for &(t, v) in keys {
            track.insert(Keyframe::new(t, v));
        }
        track
    }

    #[test]
    fn test_update_samples_tracks() {
        let mut actor = Actor::new(rig(), RetargetConfig::default()).unwrap();
        let turn = Quat::from_rotation_y(1.0);
        actor.load(
            &motion("turn", vec![AnimationTrack::rotation("Hips", linear(&[(0.0, Quat::IDENTITY), (1.0, turn)]))]),
            LoopMode::Once,
        );
        assert!(actor.play("turn"));
        assert!(!actor.play("missing"));

        actor.update(0.5);
        let hips = actor.rig().skeleton.find("Hips").unwrap();
        let expected = Quat::IDENTITY.slerp(turn, 0.5);
        assert!(actor.pose().rotations[hips].abs_diff_eq(expected, 1e-5));
        assert!(actor.get_track("Hips.quaternion").is_some());
        assert!(!actor.is_ik_enabled());
        assert!(actor.solve_reports().is_empty());
    }

    #[test]
    fn test_foot_ik_reaches_target() {
        let mut actor = Actor::new(rig(), RetargetConfig::default()).unwrap();
        let mut source = motion(
            "step",
            vec![AnimationTrack::position("LeftFootIK", linear(&[(0.0, Vec3::new(0.0, 5.56, 3.0))]))],
        );
        let mut switch = IkSwitchTrack::new("LeftFootIK");
        switch.push(0.0, true, true);
        source.ik_switches.push(switch);

        actor.load(&source, LoopMode::Repeat);
        actor.play("step");
        assert!(actor.is_ik_enabled());
        actor.update(0.016);

        let skeleton = &actor.rig().skeleton;
        let foot = actor.pose().world_position(skeleton.find("LeftFoot").unwrap());
        let target = actor.pose().world_position(skeleton.find("LeftFootIK").unwrap());
        assert!(target.abs_diff_eq(Vec3::new(2.0, 5.56, 3.0), 1e-4));
        assert!(foot.distance(target) < 1e-2, "{:?} vs {:?}", foot, target);
        assert!(actor.solve_reports().iter().any(|r| r.rotations > 0));

        // 手动关闭后不再求解
        assert!(actor.set_chain_enabled("LeftFootIK", false));
        assert!(!actor.set_chain_enabled("Nope", true));
        actor.update(0.016);
        let foot = actor.pose().world_position(actor.rig().skeleton.find("LeftFoot").unwrap());
        assert!(foot.abs_diff_eq(Vec3::new(2.0, 1.56, 0.0), 1e-4));
    }

    #[test]
    fn test_camera_and_expressions() {
        let mut actor = Actor::new(rig(), RetargetConfig::default()).unwrap();
        let mut source = motion("cam", Vec::new());
        source.camera = Some(AnimationClip::with_tracks(
            "camera",
            vec![
                AnimationTrack::position(CAMERA, linear(&[(0.0, Vec3::new(0.0, 10.0, -50.0))])),
                AnimationTrack::position(CAMERA_TARGET, linear(&[(0.0, Vec3::new(0.0, 10.0, 0.0))])),
                AnimationTrack::fov(CAMERA, linear(&[(0.0, 40.0_f32)])),
            ],
        ));
        actor.load(&source, LoopMode::Repeat);
        actor.play("cam");
        actor.start_expression("Joy", 1.0, None);
        for _ in 0..10 {
            actor.update(0.02);
        }

        let camera = actor.camera().unwrap();
        assert!(camera.position.abs_diff_eq(Vec3::new(0.0, 1.0, -4.0), 1e-5));
        assert!(camera.target.abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-5));
        assert_eq!(camera.fov, 40.0);
        assert_eq!(actor.pose().morph_weight("Joy"), 1.0);

        actor.end_expression("Joy");
        for _ in 0..10 {
            actor.update(0.02);
        }
        assert_eq!(actor.pose().morph_weight("Joy"), 0.0);
    }
}
