//! BVH 文件加载器
//!
//! 解析 HIERARCHY 与 MOTION 两部分，骨骼名称与坐标轴在解析时即转换为规范形式：
//! 所有偏移、每帧位置与旋转都经过映射表的轴向修正，后续阶段不再处理坐标系。

use std::fs;
use std::path::Path;
use std::str::FromStr;

use glam::{Quat, Vec3};

use crate::retarget::{BoneMapSet, BoneMapTable};
use crate::skeleton::{BoneFlags, BoneLink, BoneSet, Channel};
use crate::{CodecError, MotionError, Result, RetargetWarning};

use super::bezier_curve::BezierCurve;
use super::clip::AnimationClip;
use super::keyframe::{BoneKeyframe, Interpolation, Keyframe};
use super::motion_track::{AnimationTrack, KeyframeTrack};

// ============================================================================
// 词法
// ============================================================================

/// 带行号的空白分隔词法流
struct Tokens<'a> {
    tokens: Vec<(usize, &'a str)>,
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        let tokens = text
            .lines()
            .enumerate()
            .flat_map(|(i, line)| line.split_whitespace().map(move |t| (i + 1, t)))
            .collect();
        Self { tokens, pos: 0 }
    }

    /// 当前位置所在行（流结束时为最后一行）
    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |&(line, _)| line)
    }

    /// 剩余 token 数
    fn remaining(&self) -> usize {
        self.tokens.len().saturating_sub(self.pos)
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).map(|&(_, t)| t)
    }

    fn next(&mut self) -> std::result::Result<(usize, &'a str), CodecError> {
        let token = self.tokens.get(self.pos).copied().ok_or_else(|| CodecError::MalformedHierarchy {
            line: self.line(),
            message: "unexpected end of file".to_string(),
        })?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, keyword: &str) -> std::result::Result<usize, CodecError> {
        let (line, token) = self.next()?;
        if token != keyword {
            return Err(malformed(line, format!("expected '{}', found '{}'", keyword, token)));
        }
        Ok(line)
    }

    fn number<T: FromStr>(&mut self) -> std::result::Result<T, CodecError> {
        let (line, token) = self.next()?;
        token.parse().map_err(|_| CodecError::InvalidNumeric {
            line,
            token: token.to_string(),
        })
    }

    fn vec3(&mut self) -> std::result::Result<Vec3, CodecError> {
        Ok(Vec3::new(self.number()?, self.number()?, self.number()?))
    }
}

fn malformed(line: usize, message: impl Into<String>) -> CodecError {
    CodecError::MalformedHierarchy {
        line,
        message: message.into(),
    }
}

// ============================================================================
// BVH 文件
// ============================================================================

/// 解析后的 BVH 文件
#[derive(Debug, Clone)]
pub struct BvhFile {
    /// 使用的映射表名称
    pub bone_map: String,
    /// 规范名称、已修正坐标轴的骨骼树
    pub skeleton: BoneSet,
    pub frame_count: usize,
    /// 每帧时长（秒）
    pub frame_time: f32,
    /// 按骨骼索引排列的逐帧数据（末端节点为空）
    pub frames: Vec<Vec<BoneKeyframe>>,
    pub warnings: Vec<RetargetWarning>,
}

impl BvhFile {
    /// 从文件加载
    pub fn load<P: AsRef<Path>>(path: P, maps: &BoneMapSet) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::parse(&text, maps)
    }

    /// 根据 ROOT 名称选择映射表并解析
    pub fn parse(text: &str, maps: &BoneMapSet) -> Result<Self> {
        let root_name = detect_root_name(text)?;
        let selection = maps.detect(root_name);
        let mut file = Self::parse_with(text, selection.table)?;
        if let Some(warning) = selection.warning {
            file.warnings.insert(0, warning);
        }
        Ok(file)
    }

    /// 使用指定映射表解析
    pub fn parse_with(text: &str, map: &BoneMapTable) -> Result<Self> {
        let mut tokens = Tokens::new(text);
        let mut skeleton = BoneSet::new();
        let mut warnings = Vec::new();

        tokens.expect("HIERARCHY")?;
        let (line, kind) = tokens.next()?;
        if !kind.eq_ignore_ascii_case("ROOT") {
            return Err(malformed(line, format!("expected 'ROOT', found '{}'", kind)).into());
        }
        read_node(&mut tokens, &mut skeleton, None, map, &mut warnings)?;

        if let Some(token) = tokens.peek() {
            if token.eq_ignore_ascii_case("ROOT") {
                return Err(malformed(tokens.line(), "multiple ROOT nodes are not supported").into());
            }
        }
        tokens.expect("MOTION")?;
        tokens.expect("Frames:")?;
        let frame_count: usize = tokens.number()?;
        tokens.expect("Frame")?;
        tokens.expect("Time:")?;
        let line = tokens.line();
        let frame_time: f32 = tokens.number()?;
        if !frame_time.is_finite() || (frame_count > 1 && frame_time <= 0.0) {
            return Err(malformed(line, format!("frame time must be positive, found {}", frame_time)).into());
        }

        // 帧数必须能被剩余数据容纳，避免按头部声明的帧数分配
        let values_per_frame: usize = skeleton.iter().map(|b| b.channels.len()).sum();
        if values_per_frame > 0 && frame_count > tokens.remaining() / values_per_frame {
            return Err(malformed(
                tokens.line(),
                format!(
                    "{} frames declared but only {} values remain ({} per frame)",
                    frame_count,
                    tokens.remaining(),
                    values_per_frame
                ),
            )
            .into());
        }
        let sampled_frames = if values_per_frame == 0 { 0 } else { frame_count };

        let mut frames: Vec<Vec<BoneKeyframe>> = skeleton
            .iter()
            .map(|b| Vec::with_capacity(if b.has_channels() { sampled_frames } else { 0 }))
            .collect();

        for frame in 0..sampled_frames {
            let time = frame as f32 * frame_time;
            for (index, bone) in skeleton.iter().enumerate() {
                if !bone.has_channels() {
                    continue;
                }
                let key = read_frame(&mut tokens, bone, time, map)?;
                frames[index].push(key);
            }
        }

        if tokens.peek().is_some() {
            log::warn!("BVH: ignoring data after {} frames (line {})", frame_count, tokens.line());
        }

        log::info!(
            "BVH loaded: {} nodes, {} frames at {:.4}s, bone map '{}'",
            skeleton.len(),
            frame_count,
            frame_time,
            map.name
        );

        Ok(Self {
            bone_map: map.name.clone(),
            skeleton,
            frame_count,
            frame_time,
            frames,
            warnings,
        })
    }

    /// 全部节点数
    pub fn node_count(&self) -> usize {
        self.skeleton.len()
    }

    pub fn end_site_count(&self) -> usize {
        self.skeleton.iter().filter(|b| b.is_end_site()).count()
    }

    pub fn channel_node_count(&self) -> usize {
        self.skeleton.iter().filter(|b| b.has_channels()).count()
    }

    pub fn duration(&self) -> f32 {
        self.frame_count.saturating_sub(1) as f32 * self.frame_time
    }

    /// 生成动画片段：每个带位置通道的节点一条位置轨道，每个带通道的节点一条旋转轨道
    pub fn to_clip(&self, name: &str) -> AnimationClip {
        let mut clip = AnimationClip::new(name);
        for (bone, keys) in self.skeleton.iter().zip(&self.frames) {
            if !bone.has_channels() {
                continue;
            }

            if bone.channels.iter().any(Channel::is_position) {
                let mut track = KeyframeTrack::new(Interpolation::Linear);
                for key in keys {
                    track.insert(Keyframe::new(key.time, key.position));
                }
                track.optimize();
                clip.push(AnimationTrack::position(bone.name.as_str(), track));
            }

            let mut track = KeyframeTrack::new(Interpolation::Linear);
            for key in keys {
                track.insert(Keyframe::new(key.time, key.rotation));
            }
            track.optimize();
            clip.push(AnimationTrack::rotation(bone.name.as_str(), track));
        }
        clip
    }
}

/// 读取 ROOT 名称（用于选择映射表）
fn detect_root_name(text: &str) -> Result<&str> {
    let mut tokens = Tokens::new(text);
    tokens.expect("HIERARCHY")?;
    let (line, kind) = tokens.next()?;
    if !kind.eq_ignore_ascii_case("ROOT") {
        return Err(MotionError::Codec(malformed(line, format!("expected 'ROOT', found '{}'", kind))));
    }
    Ok(tokens.next()?.1)
}

/// 末端节点名称：`{父骨骼}_end`，重复时追加序号
fn end_site_name(skeleton: &BoneSet, parent: usize) -> String {
    let base = format!("{}_end", skeleton.bones()[parent].name);
    if skeleton.find(&base).is_none() {
        return base;
    }
    let mut n = 1;
    loop {
        let name = format!("{}{}", base, n);
        if skeleton.find(&name).is_none() {
            return name;
        }
        n += 1;
    }
}

/// 递归读取节点（关键字与名称已部分消费：调用时下一个词为名称）
fn read_node(
    tokens: &mut Tokens<'_>,
    skeleton: &mut BoneSet,
    parent: Option<usize>,
    map: &BoneMapTable,
    warnings: &mut Vec<RetargetWarning>,
) -> Result<usize> {
    let (line, source_name) = tokens.next()?;
    let name = map.resolve_logged(source_name, warnings);
    if skeleton.find(&name).is_some() {
        return Err(malformed(line, format!("duplicate joint '{}'", name)).into());
    }

    tokens.expect("{")?;
    tokens.expect("OFFSET")?;
    let offset = map.adjust_position(tokens.vec3()?);

    tokens.expect("CHANNELS")?;
    let line = tokens.line();
    let count: usize = tokens.number()?;
    if count > 6 {
        return Err(malformed(line, format!("at most 6 channels per joint, found {}", count)).into());
    }
    let mut channels = Vec::with_capacity(count);
    for _ in 0..count {
        let (line, token) = tokens.next()?;
        let channel = Channel::parse(token)
            .ok_or_else(|| malformed(line, format!("unknown channel '{}'", token)))?;
        channels.push(channel);
    }

    let index = skeleton.add_bone(BoneLink::new(name, parent, offset).with_channels(channels))?;

    loop {
        let (line, token) = tokens.next()?;
        match token {
            "}" => return Ok(index),
            "End" => {
                tokens.expect("Site")?;
                tokens.expect("{")?;
                tokens.expect("OFFSET")?;
                let offset = map.adjust_position(tokens.vec3()?);
                tokens.expect("}")?;
                let name = end_site_name(skeleton, index);
                skeleton.add_bone(
                    BoneLink::new(name, Some(index), offset).with_flags(BoneFlags::END_SITE),
                )?;
            }
            t if t.eq_ignore_ascii_case("JOINT") => {
                read_node(tokens, skeleton, Some(index), map, warnings)?;
            }
            other => {
                return Err(malformed(line, format!("expected JOINT, End Site or '}}', found '{}'", other)).into());
            }
        }
    }
}

/// 读取单个节点一帧的数据
///
/// 旋转通道按声明顺序右乘组合。
fn read_frame(
    tokens: &mut Tokens<'_>,
    bone: &BoneLink,
    time: f32,
    map: &BoneMapTable,
) -> std::result::Result<BoneKeyframe, CodecError> {
    let mut position = Vec3::ZERO;
    let mut rotation = Quat::IDENTITY;
    for channel in &bone.channels {
        let value: f32 = tokens.number()?;
        match channel {
            Channel::XPosition => position.x = value,
            Channel::YPosition => position.y = value,
            Channel::ZPosition => position.z = value,
            Channel::XRotation | Channel::YRotation | Channel::ZRotation => {
                if let Some(axis) = channel.rotation_axis() {
                    rotation *= Quat::from_axis_angle(axis, value.to_radians());
                }
            }
        }
    }
    Ok(BoneKeyframe {
        time,
        position: map.adjust_position(position),
        rotation: map.adjust_bone_rotation(&bone.name, rotation),
        curves: [BezierCurve::LINEAR; 4],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::motion_track::{MotionTrack, TrackProperty};

    const SINGLE: &str = "HIERARCHY
ROOT Hips
{
    OFFSET 0 0 0
    CHANNELS 2 Yposition Yrotation
}
MOTION
Frames: 2
Frame Time: 1
0 0
1 90
";

    const BODY: &str = "HIERARCHY
ROOT Hips
{
  OFFSET 0.0 90.0 0.0
  CHANNELS 6 Xposition Yposition Zposition Zrotation Xrotation Yrotation
  JOINT LeftUpLeg
  {
    OFFSET 10.0 -5.0 0.0
    CHANNELS 3 Zrotation Xrotation Yrotation
    JOINT LeftLeg
    {
      OFFSET 0.0 -40.0 0.0
      CHANNELS 3 Zrotation Xrotation Yrotation
      End Site
      {
        OFFSET 0.0 -40.0 0.0
      }
    }
  }
  JOINT Spine
  {
    OFFSET 0.0 10.0 0.0
    CHANNELS 3 Zrotation Xrotation Yrotation
    End Site
    {
      OFFSET 0.0 20.0 0.0
    }
  }
}
MOTION
Frames: 3
Frame Time: 0.0333333
0 90 0 0 0 0  0 0 0  0 0 0  0 0 0
1 90 0 0 0 0  0 0 0  0 0 0  0 0 0
2 90 0 0 0 0  0 0 0  0 0 0  0 0 0
";

    #[test]
    fn test_single_root_end_to_end() {
        let bvh = BvhFile::parse(SINGLE, &BoneMapSet::default()).unwrap();
        assert!(matches!(bvh.warnings[0], RetargetWarning::NoBoneMap { .. }));
        let clip = bvh.to_clip("test");

        let position = clip.find("Hips", TrackProperty::Position).unwrap().as_vector().unwrap();
        assert_eq!(position.times(), vec![0.0, 1.0]);
        assert_eq!(position.values(), vec![Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0)]);

        let rotation = clip.find("Hips", TrackProperty::Rotation).unwrap().as_rotation().unwrap();
        let expected = Quat::from_rotation_y(90f32.to_radians());
        assert!(rotation.sample(1.0).abs_diff_eq(expected, 1e-5));
        assert_eq!(clip.tracks.len(), 2);
    }

    #[test]
    fn test_node_counts() {
        let bvh = BvhFile::parse_with(BODY, &BoneMapTable::identity()).unwrap();
        assert_eq!(bvh.node_count(), 6);
        assert_eq!(bvh.end_site_count(), 2);
        assert_eq!(bvh.channel_node_count(), 4);
        assert_eq!(bvh.end_site_count() + bvh.channel_node_count(), bvh.node_count());
        assert!(bvh.skeleton.find("LeftLeg_end").is_some());
        assert_eq!(bvh.frame_count, 3);
    }

    #[test]
    fn test_builtin_map_renames_and_adjusts() {
        let maps = BoneMapSet::builtin().unwrap();
        let bvh = BvhFile::parse(BODY, &maps).unwrap();
        assert_eq!(bvh.bone_map, "BVH");
        assert!(bvh.warnings.is_empty());

        let upper = bvh.skeleton.bone("LeftUpperLeg").unwrap();
        // [-1, 1, -1, 1]：x、z 取反
        assert_eq!(upper.rest_position, Vec3::new(-10.0, -5.0, 0.0));
        assert!(bvh.skeleton.find("LeftLowerLeg_end").is_some());

        let hips = bvh.skeleton.find("Hips").unwrap();
        assert_eq!(bvh.frames[hips][2].position, Vec3::new(-2.0, 90.0, 0.0));
    }

    #[test]
    fn test_rotation_order_is_preserved() {
        let text = "HIERARCHY
ROOT Hips
{
OFFSET 0 0 0
CHANNELS 2 Xrotation Zrotation
}
MOTION
Frames: 1
Frame Time: 1
90 90
";
        let bvh = BvhFile::parse_with(text, &BoneMapTable::identity()).unwrap();
        let expected = Quat::from_rotation_x(90f32.to_radians()) * Quat::from_rotation_z(90f32.to_radians());
        assert!(bvh.frames[0][0].rotation.abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn test_malformed_hierarchy() {
        let text = SINGLE.replace("OFFSET", "OFSET");
        match BvhFile::parse_with(&text, &BoneMapTable::identity()) {
            Err(MotionError::Codec(CodecError::MalformedHierarchy { line, .. })) => assert_eq!(line, 4),
            other => panic!("unexpected {:?}", other),
        }

        let text = SINGLE.replace("MOTION", "");
        assert!(matches!(
            BvhFile::parse_with(&text, &BoneMapTable::identity()),
            Err(MotionError::Codec(CodecError::MalformedHierarchy { .. }))
        ));
    }

    #[test]
    fn test_invalid_numeric() {
        let text = SINGLE.replace("1 90", "1 ninety");
        match BvhFile::parse_with(&text, &BoneMapTable::identity()) {
            Err(MotionError::Codec(CodecError::InvalidNumeric { line, token })) => {
                assert_eq!(line, 11);
                assert_eq!(token, "ninety");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_frame_count_exceeds_data() {
        let text = SINGLE.replace("Frames: 2", "Frames: 100000000000000000");
        match BvhFile::parse_with(&text, &BoneMapTable::identity()) {
            Err(MotionError::Codec(CodecError::MalformedHierarchy { message, .. })) => {
                assert!(message.contains("100000000000000000"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_channel_count_limit() {
        let text = SINGLE.replace("CHANNELS 2", "CHANNELS 4294967295");
        match BvhFile::parse_with(&text, &BoneMapTable::identity()) {
            Err(MotionError::Codec(CodecError::MalformedHierarchy { line, .. })) => assert_eq!(line, 5),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_frame_time() {
        for bad in ["NaN", "inf", "-1"] {
            let text = SINGLE.replace("Frame Time: 1", &format!("Frame Time: {bad}"));
            match BvhFile::parse_with(&text, &BoneMapTable::identity()) {
                Err(MotionError::Codec(CodecError::MalformedHierarchy { line, .. })) => assert_eq!(line, 9),
                other => panic!("unexpected {:?} for {}", other, bad),
            }
        }
    }

    #[test]
    fn test_missing_frame_data() {
        let text = SINGLE.replace("1 90\n", "");
        assert!(matches!(
            BvhFile::parse_with(&text, &BoneMapTable::identity()),
            Err(MotionError::Codec(CodecError::MalformedHierarchy { .. }))
        ));
    }
}
