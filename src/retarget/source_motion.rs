//! 源动作
//!
//! 把 BVH / VMD / 外部解码的片段统一为规范名称、规范坐标轴的轨道集合，
//! 同时记录源骨骼的髋部高度，供重定向时计算比例。

use std::collections::BTreeMap;
use std::f32::consts::PI;

use glam::{EulerRot, Quat, Vec3};

use crate::animation::{
    AnimationClip, AnimationTrack, BezierCurve, BvhFile, IkSwitchTrack, Interpolation, Keyframe,
    KeyframeTrack, TrackData, VmdCameraKey, VmdFile,
};
use crate::config::RetargetConfig;
use crate::skeleton::{BoneSet, CENTER, ROOT};
use crate::{Result, RetargetWarning};

use super::bone_map::{BoneMapSet, BoneMapTable, HIPS};

/// 相机轨道的目标名称
pub const CAMERA: &str = "camera";
/// 相机注视点轨道的目标名称
pub const CAMERA_TARGET: &str = "target";

/// 源动作格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Bvh,
    Vmd,
    External,
}

/// 规范化后的源动作（加载完成后不再修改）
#[derive(Debug, Clone)]
pub struct SourceMotion {
    pub name: String,
    pub kind: SourceKind,
    /// 骨骼轨道
    pub clip: AnimationClip,
    /// 表情轨道
    pub morphs: Option<AnimationClip>,
    /// 相机轨道
    pub camera: Option<AnimationClip>,
    pub ik_switches: Vec<IkSwitchTrack>,
    /// 源骨骼（VMD 没有）
    pub skeleton: Option<BoneSet>,
    /// 源骨骼静止姿态的髋部高度
    pub hip_height: f32,
    pub warnings: Vec<RetargetWarning>,
}

impl SourceMotion {
    /// BVH：骨骼与轨道在解析时已完成改名和轴向修正
    pub fn from_bvh(name: &str, bvh: &BvhFile) -> Self {
        let skeleton = bvh.skeleton.clone();
        let hip_height = skeleton
            .find(HIPS)
            .or_else(|| skeleton.root())
            .map_or(0.0, |i| skeleton.chain_offset(None, i).y);

        Self {
            name: name.to_string(),
            kind: SourceKind::Bvh,
            clip: bvh.to_clip(name),
            morphs: None,
            camera: None,
            ik_switches: Vec::new(),
            skeleton: Some(skeleton),
            hip_height,
            warnings: bvh.warnings.clone(),
        }
    }

    /// 外部解码器产出的片段：按映射表改名并做轴向修正
    pub fn from_external_clip(
        clip: &AnimationClip,
        maps: &BoneMapSet,
        table_name: &str,
        skeleton: Option<&BoneSet>,
    ) -> Result<Self> {
        let table = maps.require(table_name)?;
        let mut warnings = Vec::new();
        let mut canonical: BTreeMap<&str, String> = BTreeMap::new();
        let mut tracks = Vec::with_capacity(clip.tracks.len());

        for track in &clip.tracks {
            let target = canonical
                .entry(track.target.as_str())
                .or_insert_with(|| table.resolve_logged(&track.target, &mut warnings))
                .clone();
            let mut track = track.clone();
            match &mut track.data {
                TrackData::Vector(t) => t.map_values(|v| table.adjust_position(v)),
                TrackData::Rotation(t) => t.map_values(|q| table.adjust_bone_rotation(&target, q)),
                TrackData::Scalar(_) => {}
            }
            track.target = target;
            tracks.push(track);
        }

        // 源骨骼中映射为 Hips 的骨骼
        let hip_height = skeleton
            .and_then(|s| {
                s.iter()
                    .position(|b| table.resolve(&b.name) == HIPS)
                    .map(|i| table.adjust_position(s.chain_offset(None, i)).y)
            })
            .unwrap_or(0.0);

        log::info!(
            "External clip '{}' canonicalised with '{}': {} tracks",
            clip.name,
            table.name,
            tracks.len()
        );

        Ok(Self {
            name: clip.name.clone(),
            kind: SourceKind::External,
            clip: AnimationClip::with_tracks(clip.name.as_str(), tracks),
            morphs: None,
            camera: None,
            ik_switches: Vec::new(),
            skeleton: skeleton.cloned(),
            hip_height,
            warnings,
        })
    }

    /// VMD：分组、Center 偏移、IK 骨骼局部化、轴向与扭转修正
    ///
    /// `donor` 为源模型骨骼（规范名称，静止姿态），为空时使用配置中的标准偏移。
    pub fn from_vmd(
        name: &str,
        vmd: &VmdFile,
        table: &BoneMapTable,
        config: &RetargetConfig,
        donor: Option<&BoneSet>,
    ) -> Self {
        let mut warnings = Vec::new();

        let mut motions = group_bone_keys(vmd, table, &mut warnings);

        let center_offset = donor
            .and_then(|d| d.find(HIPS).map(|hips| d.chain_offset(None, hips)))
            .unwrap_or(config.source_center_offset);
        if let Some(keys) = motions.get_mut(CENTER) {
            for key in keys {
                key.position += center_offset;
            }
        }

        let enabled = initial_ik_states(vmd, table);
        for side in ["Right", "Left"] {
            let foot_ik = format!("{side}FootIK");
            let toe_ik = format!("{side}ToeIK");
            let on = |name: &str| enabled.get(name).copied().unwrap_or(false);
            if on(&foot_ik) || on(&toe_ik) {
                let offsets = SourceIkOffsets::resolve(side, config, donor);
                rebase_leg_ik(&mut motions, side, &offsets);
            } else {
                motions.remove(&foot_ik);
                motions.remove(&toe_ik);
            }
        }

        let snap = config.bezier_snap_seconds();
        let mut clip = AnimationClip::new(name);
        for (canonical, mut keys) in motions {
            keys.sort_by_key(|k| k.frame);

            let positions = keys
                .iter()
                .map(|k| {
                    Keyframe::with_curves(
                        config.frame_to_seconds(k.frame),
                        table.adjust_position(k.position),
                        [k.curves[0], k.curves[1], k.curves[2]],
                    )
                })
                .collect();
            let rotations = keys
                .iter()
                .map(|k| {
                    Keyframe::with_curve(
                        config.frame_to_seconds(k.frame),
                        table.adjust_bone_rotation(&canonical, k.rotation),
                        k.curves[3],
                    )
                })
                .collect();

            let track_name = format!("{canonical}.position");
            let mut position =
                KeyframeTrack::from_keyframes(&track_name, positions, Interpolation::Bezier, &mut warnings)
                    .with_snap(snap);
            position.optimize();
            let track_name = format!("{canonical}.quaternion");
            let mut rotation =
                KeyframeTrack::from_keyframes(&track_name, rotations, Interpolation::Bezier, &mut warnings)
                    .with_snap(snap);
            rotation.optimize();

            clip.push(AnimationTrack::position(canonical.as_str(), position));
            clip.push(AnimationTrack::rotation(canonical.as_str(), rotation));
        }

        let morphs = (!vmd.morphs.is_empty()).then(|| build_morphs(name, vmd, table, config, &mut warnings));
        let camera = (!vmd.cameras.is_empty()).then(|| build_camera(&vmd.cameras, config));
        let ik_switches = build_ik_switches(vmd, table, config);

        log::info!(
            "VMD motion '{}': {} tracks, {} IK switches, center offset {:?}",
            name,
            clip.tracks.len(),
            ik_switches.len(),
            center_offset
        );

        Self {
            name: name.to_string(),
            kind: SourceKind::Vmd,
            clip,
            morphs,
            camera,
            ik_switches,
            skeleton: None,
            hip_height: center_offset.y,
            warnings,
        }
    }

    /// 是否为某个 IK 目标提供了开关轨道
    pub fn ik_switch(&self, target: &str) -> Option<&IkSwitchTrack> {
        self.ik_switches.iter().find(|t| t.name == target)
    }

    pub fn duration(&self) -> f32 {
        let camera = self.camera.as_ref().map_or(0.0, AnimationClip::duration);
        let morphs = self.morphs.as_ref().map_or(0.0, AnimationClip::duration);
        self.clip.duration().max(camera).max(morphs)
    }
}

// ============================================================================
// VMD 骨骼关键帧
// ============================================================================

/// 原始坐标系下的骨骼关键帧
#[derive(Debug, Clone, Copy)]
struct RawKey {
    frame: u32,
    position: Vec3,
    rotation: Quat,
    curves: [BezierCurve; 4],
}

/// 按规范名称分组；未映射的骨骼按原名直通，每个骨骼只警告一次
fn group_bone_keys(
    vmd: &VmdFile,
    table: &BoneMapTable,
    warnings: &mut Vec<RetargetWarning>,
) -> BTreeMap<String, Vec<RawKey>> {
    let mut canonical: BTreeMap<&str, String> = BTreeMap::new();
    let mut motions: BTreeMap<String, Vec<RawKey>> = BTreeMap::new();
    for key in &vmd.bones {
        let name = canonical
            .entry(key.name.as_str())
            .or_insert_with(|| table.resolve_logged(&key.name, warnings));
        motions.entry(name.clone()).or_default().push(RawKey {
            frame: key.frame,
            position: key.position,
            rotation: key.rotation,
            curves: key.curves(),
        });
    }
    motions
}

/// 最早一条 IK 记录中的开关状态（整段动作共用）
fn initial_ik_states(vmd: &VmdFile, table: &BoneMapTable) -> BTreeMap<String, bool> {
    vmd.iks
        .iter()
        .min_by_key(|k| k.frame)
        .map(|first| {
            first
                .states
                .iter()
                .map(|s| (table.resolve(&s.name).to_string(), s.enabled))
                .collect()
        })
        .unwrap_or_default()
}

/// 源模型 IK 骨骼的静止偏移
struct SourceIkOffsets {
    parent: Vec3,
    foot: Vec3,
    toe: Vec3,
}

impl SourceIkOffsets {
    fn resolve(side: &str, config: &RetargetConfig, donor: Option<&BoneSet>) -> Self {
        let rest = |name: String| donor.and_then(|d| d.bone(&name)).map(|b| b.rest_position);
        let mut parent = config.source_foot_ik_parent_offset;
        if side == "Left" {
            parent.x = -parent.x;
        }
        Self {
            parent: rest(format!("{side}FootIKParent")).unwrap_or(parent),
            foot: rest(format!("{side}FootIK")).unwrap_or(config.source_foot_ik_offset),
            toe: rest(format!("{side}ToeIK")).unwrap_or(config.source_toe_ik_offset),
        }
    }
}

/// 把一条腿的 IK 轨道改写为含静止偏移的局部位置
///
/// 父骨骼链：Root -> FootIKParent -> FootIK -> ToeIK，
/// 每一级使用上一级改写后的轨道作为父轨道。
fn rebase_leg_ik(motions: &mut BTreeMap<String, Vec<RawKey>>, side: &str, offsets: &SourceIkOffsets) {
    let parent_name = format!("{side}FootIKParent");
    let foot_name = format!("{side}FootIK");
    let toe_name = format!("{side}ToeIK");

    let chain = [
        (parent_name.as_str(), ROOT, offsets.parent, false),
        (foot_name.as_str(), parent_name.as_str(), offsets.foot, false),
        (toe_name.as_str(), foot_name.as_str(), offsets.toe, true),
    ];
    for (child, parent, offset, turn) in chain {
        let mut child_keys = motions.remove(child).unwrap_or_default();
        child_keys.sort_by_key(|k| k.frame);
        let mut parent_keys = motions.get(parent).cloned().unwrap_or_default();
        parent_keys.sort_by_key(|k| k.frame);

        let rebased = local_offset(offset, &child_keys, &parent_keys, turn);
        if !rebased.is_empty() {
            motions.insert(child.to_string(), rebased);
        }
    }
}

/// 子骨骼位置 + 父骨骼旋转后的静止偏移，帧取父子关键帧的并集
///
/// `turn` 为真时父旋转再右乘绕 Y 轴 180°（脚尖朝向 -Z）。
fn local_offset(offset: Vec3, child: &[RawKey], parent: &[RawKey], turn: bool) -> Vec<RawKey> {
    let mut results: Vec<RawKey> = Vec::with_capacity(child.len() + parent.len());
    for key in child.iter().chain(parent) {
        if results.iter().any(|r| r.frame == key.frame) {
            continue;
        }
        let (_, parent_rotation) = sample_raw(parent, key.frame);
        let (position, rotation) = sample_raw(child, key.frame);
        let parent_rotation = if turn {
            parent_rotation * Quat::from_rotation_y(PI)
        } else {
            parent_rotation
        };
        results.push(RawKey {
            frame: key.frame,
            position: position + parent_rotation * offset,
            rotation,
            curves: key.curves,
        });
    }
    results.sort_by_key(|k| k.frame);
    results
}

/// 线性插值原始关键帧（超出范围时保持端点）
fn sample_raw(keys: &[RawKey], frame: u32) -> (Vec3, Quat) {
    let next = keys.partition_point(|k| k.frame <= frame);
    match (next.checked_sub(1).map(|i| &keys[i]), keys.get(next)) {
        (None, None) => (Vec3::ZERO, Quat::IDENTITY),
        (Some(k), None) | (None, Some(k)) => (k.position, k.rotation),
        (Some(a), Some(b)) => {
            let w = (frame - a.frame) as f32 / (b.frame - a.frame) as f32;
            (a.position.lerp(b.position, w), a.rotation.slerp(b.rotation, w))
        }
    }
}

// ============================================================================
// 表情 / 相机 / IK 开关
// ============================================================================

fn build_morphs(
    name: &str,
    vmd: &VmdFile,
    table: &BoneMapTable,
    config: &RetargetConfig,
    warnings: &mut Vec<RetargetWarning>,
) -> AnimationClip {
    let mut groups: BTreeMap<String, Vec<Keyframe<f32>>> = BTreeMap::new();
    for key in &vmd.morphs {
        let morph = table.morph_name(&key.name).unwrap_or(&key.name);
        groups
            .entry(morph.to_string())
            .or_default()
            .push(Keyframe::new(config.frame_to_seconds(key.frame), key.weight));
    }

    let mut clip = AnimationClip::new(format!("{name}.morphs"));
    for (morph, keys) in groups {
        // 只有一帧且权重为 0 的表情没有意义
        if let [only] = keys.as_slice() {
            if only.value == 0.0 {
                continue;
            }
        }
        let track_name = format!("{morph}.weight");
        let mut track = KeyframeTrack::from_keyframes(&track_name, keys, Interpolation::Linear, warnings);
        track.optimize();
        clip.push(AnimationTrack::weight(morph, track));
    }
    clip
}

fn build_camera(keys: &[VmdCameraKey], config: &RetargetConfig) -> AnimationClip {
    let mut keys: Vec<&VmdCameraKey> = keys.iter().collect();
    keys.sort_by_key(|k| k.frame);

    let mut targets = KeyframeTrack::new(Interpolation::Linear);
    let mut positions = KeyframeTrack::new(Interpolation::Linear);
    let mut rotations = KeyframeTrack::new(Interpolation::Bezier).with_snap(config.bezier_snap_seconds());
    let mut fovs = KeyframeTrack::new(Interpolation::Step);

    for key in keys {
        let time = config.frame_to_seconds(key.frame);
        let rotation = Quat::from_euler(EulerRot::XYZ, -key.rotation.x, -key.rotation.y, -key.rotation.z);
        let position = rotation * Vec3::new(0.0, 0.0, key.distance) + key.target;

        targets.insert(Keyframe::new(time, mirror_x(key.target)));
        positions.insert(Keyframe::new(time, mirror_x(position)));
        rotations.insert(Keyframe::with_curve(time, rotation, key.curves().rotation));
        fovs.insert(Keyframe::new(time, key.fov as f32));
    }
    targets.optimize();
    positions.optimize();
    rotations.optimize();
    fovs.optimize();

    AnimationClip::with_tracks(
        CAMERA,
        vec![
            AnimationTrack::position(CAMERA_TARGET, targets),
            AnimationTrack::position(CAMERA, positions),
            AnimationTrack::rotation(CAMERA, rotations),
            AnimationTrack::fov(CAMERA, fovs),
        ],
    )
}

#[inline]
fn mirror_x(v: Vec3) -> Vec3 {
    Vec3::new(-v.x, v.y, v.z)
}

fn build_ik_switches(vmd: &VmdFile, table: &BoneMapTable, config: &RetargetConfig) -> Vec<IkSwitchTrack> {
    let mut records: Vec<_> = vmd.iks.iter().collect();
    records.sort_by_key(|k| k.frame);

    let mut switches: Vec<IkSwitchTrack> = Vec::new();
    for record in records {
        let time = config.frame_to_seconds(record.frame);
        for state in &record.states {
            let name = table.resolve(&state.name);
            let index = match switches.iter().position(|t| t.name == name) {
                Some(index) => index,
                None => {
                    switches.push(IkSwitchTrack::new(name));
                    switches.len() - 1
                }
            };
            switches[index].push(time, state.enabled, record.shown);
        }
    }
    switches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{
        MotionTrack, VmdBoneKey, VmdCounts, VmdHeader, VmdIkKey, VmdIkState, VmdLayout, VmdMorphKey,
    };
    use crate::skeleton::BoneFlags;

    fn vocaloid() -> BoneMapTable {
        BoneMapSet::builtin().unwrap().require("Vocaloid").unwrap().clone()
    }

    fn bone_key(name: &str, frame: u32, position: Vec3, rotation: Quat) -> VmdBoneKey {
        VmdBoneKey {
            name: name.to_string(),
            frame,
            position,
            rotation,
            interpolation: VmdBoneKey::interpolation_from_curves(&[BezierCurve::LINEAR; 4]),
        }
    }

    fn vmd(bones: Vec<VmdBoneKey>, iks: Vec<VmdIkKey>) -> VmdFile {
        VmdFile {
            header: VmdHeader {
                signature: "Vocaloid Motion Data 0002".to_string(),
                model_name: "test".to_string(),
                new_format: true,
            },
            bones,
            morphs: Vec::new(),
            cameras: Vec::new(),
            iks,
            layout: VmdLayout::from_counts(true, &VmdCounts::default()),
        }
    }

    fn ik_record(frame: u32, enabled: bool) -> VmdIkKey {
        VmdIkKey {
            frame,
            shown: true,
            states: vec![
                VmdIkState { name: "右足ＩＫ".to_string(), enabled },
                VmdIkState { name: "左足ＩＫ".to_string(), enabled },
            ],
        }
    }

    #[test]
    fn test_center_offset_and_adjust() {
        let config = RetargetConfig::default();
        let file = vmd(
            vec![
                bone_key("センター", 0, Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY),
                bone_key("センター", 30, Vec3::new(1.0, 2.0, 0.0), Quat::IDENTITY),
            ],
            Vec::new(),
        );
        let motion = SourceMotion::from_vmd("dance", &file, &vocaloid(), &config, None);
        assert_eq!(motion.kind, SourceKind::Vmd);
        assert!((motion.hip_height - 12.7832).abs() < 1e-4);

        let track = motion.clip.get_track("Center.position").unwrap().as_vector().unwrap();
        assert_eq!(track.times(), vec![0.0, 1.0]);
        // x 取反，再加上 Center 偏移
        let expected = Vec3::new(-1.0, 14.7832, 0.5122);
        assert!(track.sample(1.0).abs_diff_eq(expected, 1e-4), "{:?}", track.sample(1.0));
    }

    #[test]
    fn test_donor_center_offset() {
        let mut donor = BoneSet::new();
        donor.add("Root", None, Vec3::ZERO, BoneFlags::empty()).unwrap();
        donor.add("Hips", Some("Root"), Vec3::new(0.0, 10.0, 0.0), BoneFlags::empty()).unwrap();
        let file = vmd(vec![bone_key("センター", 0, Vec3::ZERO, Quat::IDENTITY)], Vec::new());
        let motion =
            SourceMotion::from_vmd("dance", &file, &vocaloid(), &RetargetConfig::default(), Some(&donor));
        assert_eq!(motion.hip_height, 10.0);
    }

    #[test]
    fn test_disabled_ik_tracks_removed() {
        let file = vmd(
            vec![
                bone_key("右足ＩＫ", 0, Vec3::ONE, Quat::IDENTITY),
                bone_key("右つま先ＩＫ", 0, Vec3::ONE, Quat::IDENTITY),
                bone_key("右足IK親", 0, Vec3::ONE, Quat::IDENTITY),
            ],
            vec![ik_record(0, false)],
        );
        let motion = SourceMotion::from_vmd("dance", &file, &vocaloid(), &RetargetConfig::default(), None);
        assert!(motion.clip.get_track("RightFootIK.position").is_none());
        assert!(motion.clip.get_track("RightToeIK.position").is_none());
        assert!(motion.clip.get_track("RightFootIKParent.position").is_some());
        assert_eq!(motion.ik_switch("RightFootIK").unwrap().enabled_at_start(), Some(false));
    }

    #[test]
    fn test_enabled_ik_rebased_with_rest_offsets() {
        let config = RetargetConfig::default();
        let file = vmd(
            vec![
                bone_key("右足ＩＫ", 0, Vec3::new(0.5, 0.0, 0.0), Quat::IDENTITY),
                bone_key("右足ＩＫ", 10, Vec3::new(0.5, 1.0, 0.0), Quat::IDENTITY),
                bone_key("右つま先ＩＫ", 0, Vec3::ZERO, Quat::IDENTITY),
            ],
            // 以最早的记录为准
            vec![ik_record(20, false), ik_record(0, true)],
        );
        let motion = SourceMotion::from_vmd("dance", &file, &vocaloid(), &config, None);

        let foot = motion.clip.get_track("RightFootIK.position").unwrap().as_vector().unwrap();
        assert_eq!(foot.len(), 2);
        // (0.5, 0, 0) + (0, 0.9534, 0)，再将 x 取反
        assert!(foot.sample(0.0).abs_diff_eq(Vec3::new(-0.5, 0.9534, 0.0), 1e-4));

        // 脚尖偏移绕 Y 轴转 180°：z 取反
        let toe = motion.clip.get_track("RightToeIK.position").unwrap().as_vector().unwrap();
        assert!(toe.sample(0.0).abs_diff_eq(Vec3::new(0.0, -0.9534, -1.7651), 1e-4), "{:?}", toe.sample(0.0));
        // 脚尖帧取父子并集
        assert_eq!(toe.times(), vec![0.0, 10.0 / 30.0]);

        // 左腿没有关键帧，不产生轨道
        assert!(motion.clip.get_track("LeftFootIK.position").is_none());
    }

    #[test]
    fn test_unmapped_bone_passes_through() {
        let file = vmd(vec![bone_key("しっぽ", 0, Vec3::ZERO, Quat::from_rotation_x(0.3))], Vec::new());
        let motion = SourceMotion::from_vmd("dance", &file, &vocaloid(), &RetargetConfig::default(), None);
        assert!(motion.clip.get_track("しっぽ.quaternion").is_some());
        assert_eq!(
            motion.warnings,
            vec![RetargetWarning::UnmappedBone { name: "しっぽ".to_string() }]
        );
    }

    #[test]
    fn test_morphs_and_camera() {
        let mut file = vmd(Vec::new(), Vec::new());
        file.morphs = vec![
            VmdMorphKey { name: "まばたき".to_string(), frame: 30, weight: 1.0 },
            VmdMorphKey { name: "まばたき".to_string(), frame: 0, weight: 0.0 },
            VmdMorphKey { name: "あ".to_string(), frame: 0, weight: 0.0 },
        ];
        file.cameras = vec![VmdCameraKey {
            frame: 0,
            distance: -10.0,
            target: Vec3::new(1.0, 10.0, 0.0),
            rotation: Vec3::ZERO,
            interpolation: [20; 24],
            fov: 30,
            perspective: true,
        }];
        let motion = SourceMotion::from_vmd("dance", &file, &vocaloid(), &RetargetConfig::default(), None);

        let morphs = motion.morphs.unwrap();
        assert_eq!(morphs.track_names(), vec!["Blink.weight".to_string()]);
        assert_eq!(morphs.get_track("Blink.weight").unwrap().as_scalar().unwrap().times(), vec![0.0, 1.0]);

        let camera = motion.camera.unwrap();
        let position = camera.get_track("camera.position").unwrap().as_vector().unwrap();
        assert!(position.sample(0.0).abs_diff_eq(Vec3::new(-1.0, 10.0, -10.0), 1e-5));
        let target = camera.get_track("target.position").unwrap().as_vector().unwrap();
        assert!(target.sample(0.0).abs_diff_eq(Vec3::new(-1.0, 10.0, 0.0), 1e-5));
        let fov = camera.get_track("camera.fov").unwrap().as_scalar().unwrap();
        assert_eq!(fov.interpolation(), Interpolation::Step);
        assert_eq!(fov.sample(0.0), 30.0);
    }

    #[test]
    fn test_external_clip() {
        let mut maps = BoneMapSet::default();
        maps.push(BoneMapTable {
            name: "Mixamo".to_string(),
            bones: [("mixamorig:Hips".to_string(), "Hips".to_string())].into_iter().collect(),
            morphs: Default::default(),
            adjust: [-1.0, 1.0, 1.0, 1.0],
            twist: Default::default(),
        });
        let mut track = KeyframeTrack::new(Interpolation::Linear);
        track.insert(Keyframe::new(0.0, Vec3::new(1.0, 100.0, 0.0)));
        let clip = AnimationClip::with_tracks("walk", vec![AnimationTrack::position("mixamorig:Hips", track)]);

        let mut skeleton = BoneSet::new();
        skeleton
            .add("mixamorig:Hips", None, Vec3::new(0.0, 100.0, 0.0), BoneFlags::empty())
            .unwrap();

        let motion = SourceMotion::from_external_clip(&clip, &maps, "Mixamo", Some(&skeleton)).unwrap();
        assert_eq!(motion.hip_height, 100.0);
        let hips = motion.clip.get_track("Hips.position").unwrap().as_vector().unwrap();
        assert_eq!(hips.sample(0.0), Vec3::new(-1.0, 100.0, 0.0));
        assert!(SourceMotion::from_external_clip(&clip, &maps, "Missing", None).is_err());
    }
}
