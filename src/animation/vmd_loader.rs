//! VMD 文件加载器
//!
//! 先扫描各段布局并校验长度，再按布局解码记录。
//! 头部、骨骼、Morph、相机为必需段，截断时报错；
//! 光照、阴影、IK 为可选尾段，超出缓冲区即视为不存在，其后的段也不再读取。

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::{Quat, Vec3};

use crate::{CodecError, Result};

use super::bezier_curve::BezierCurve;

/// VMD 文件头
const VMD_HEADER_V1: &[u8] = b"Vocaloid Motion Data file";
const VMD_HEADER_V2: &[u8] = b"Vocaloid Motion Data 0002";

const SIGNATURE_SIZE: usize = 30;
const MODEL_NAME_SIZE: usize = 20;
const MODEL_NAME_SIZE_OLD: usize = 10;
/// 版本判断字节位置，新格式此处为 '0'
const VERSION_OFFSET: usize = 0x15;
const VERSION_BYTE: u8 = 0x30;

const BONE_NAME_SIZE: usize = 15;
const MORPH_NAME_SIZE: usize = 15;
const IK_NAME_SIZE: usize = 20;

pub const BONE_RECORD_SIZE: usize = 111;
pub const MORPH_RECORD_SIZE: usize = 23;
pub const CAMERA_RECORD_SIZE: usize = 61;
pub const LIGHT_RECORD_SIZE: usize = 28;
pub const SHADOW_RECORD_SIZE: usize = 9;
/// IK 记录固定头部：帧号 + 显示标志 + 数量
pub const IK_RECORD_HEADER_SIZE: usize = 9;
/// IK 状态条目：名称 + 开关
pub const IK_STATE_SIZE: usize = 21;

const COUNT_SIZE: usize = 4;

// ============================================================================
// 布局
// ============================================================================

/// 段布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmdSection {
    /// 第一条记录的偏移（数量字段之后）
    pub begin: usize,
    pub count: usize,
    /// 单条记录大小；IK 段为变长，此处为固定头部大小
    pub record_size: usize,
    /// 记录总字节数
    pub total: usize,
}

impl VmdSection {
    fn fixed(begin: usize, count: usize, record_size: usize) -> Self {
        Self {
            begin,
            count,
            record_size,
            total: count.saturating_mul(record_size),
        }
    }

    /// 段结束偏移
    #[inline]
    pub fn end(&self) -> usize {
        self.begin.saturating_add(self.total)
    }
}

/// 各段记录数量
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VmdCounts {
    pub bones: usize,
    pub morphs: usize,
    pub cameras: usize,
    pub lights: Option<usize>,
    pub shadows: Option<usize>,
    /// 每条 IK 记录包含的状态数
    pub ik_states: Option<Vec<usize>>,
}

/// 文件布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmdLayout {
    pub new_format: bool,
    pub header_size: usize,
    pub bone: VmdSection,
    pub morph: VmdSection,
    pub camera: VmdSection,
    pub light: Option<VmdSection>,
    pub shadow: Option<VmdSection>,
    pub ik: Option<VmdSection>,
}

impl VmdLayout {
    /// 扫描字节缓冲区，得到各段位置
    pub fn scan(bytes: &[u8]) -> std::result::Result<Self, CodecError> {
        let available = bytes.len();
        if available <= VERSION_OFFSET {
            return Err(CodecError::TruncatedBuffer {
                section: "header",
                needed: VERSION_OFFSET + 1,
                available,
            });
        }

        let new_format = bytes[VERSION_OFFSET] == VERSION_BYTE;
        let header_size = Self::header_size(new_format);
        if available < header_size {
            return Err(CodecError::TruncatedBuffer {
                section: "header",
                needed: header_size,
                available,
            });
        }

        let bone = scan_fixed(bytes, "bone", header_size, BONE_RECORD_SIZE)?;
        let morph = scan_fixed(bytes, "morph", bone.end(), MORPH_RECORD_SIZE)?;
        let camera = scan_fixed(bytes, "camera", morph.end(), CAMERA_RECORD_SIZE)?;

        let light = scan_optional(bytes, camera.end(), LIGHT_RECORD_SIZE);
        let shadow = light.and_then(|light| scan_optional(bytes, light.end(), SHADOW_RECORD_SIZE));
        let ik = shadow.and_then(|shadow| scan_ik(bytes, shadow.end()));

        Ok(Self {
            new_format,
            header_size,
            bone,
            morph,
            camera,
            light,
            shadow,
            ik,
        })
    }

    /// 由记录数量推算布局
    pub fn from_counts(new_format: bool, counts: &VmdCounts) -> Self {
        let header_size = Self::header_size(new_format);
        let bone = VmdSection::fixed(header_size + COUNT_SIZE, counts.bones, BONE_RECORD_SIZE);
        let morph = VmdSection::fixed(bone.end() + COUNT_SIZE, counts.morphs, MORPH_RECORD_SIZE);
        let camera = VmdSection::fixed(morph.end() + COUNT_SIZE, counts.cameras, CAMERA_RECORD_SIZE);

        let light = counts
            .lights
            .map(|n| VmdSection::fixed(camera.end() + COUNT_SIZE, n, LIGHT_RECORD_SIZE));
        let shadow = match (light, counts.shadows) {
            (Some(light), Some(n)) => {
                Some(VmdSection::fixed(light.end() + COUNT_SIZE, n, SHADOW_RECORD_SIZE))
            }
            _ => None,
        };
        let ik = match (shadow, &counts.ik_states) {
            (Some(shadow), Some(states)) => Some(VmdSection {
                begin: shadow.end() + COUNT_SIZE,
                count: states.len(),
                record_size: IK_RECORD_HEADER_SIZE,
                total: states
                    .iter()
                    .map(|n| IK_RECORD_HEADER_SIZE + n * IK_STATE_SIZE)
                    .sum(),
            }),
            _ => None,
        };

        Self {
            new_format,
            header_size,
            bone,
            morph,
            camera,
            light,
            shadow,
            ik,
        }
    }

    fn header_size(new_format: bool) -> usize {
        if new_format {
            SIGNATURE_SIZE + MODEL_NAME_SIZE
        } else {
            SIGNATURE_SIZE + MODEL_NAME_SIZE_OLD
        }
    }

    /// 最后一个存在的段的结束偏移
    pub fn end(&self) -> usize {
        [self.ik, self.shadow, self.light]
            .into_iter()
            .flatten()
            .next()
            .map_or(self.camera.end(), |s| s.end())
    }
}

fn read_count(bytes: &[u8], offset: usize) -> Option<usize> {
    let field = bytes.get(offset..offset.checked_add(COUNT_SIZE)?)?;
    Some(u32::from_le_bytes([field[0], field[1], field[2], field[3]]) as usize)
}

fn scan_fixed(
    bytes: &[u8],
    section: &'static str,
    offset: usize,
    record_size: usize,
) -> std::result::Result<VmdSection, CodecError> {
    let available = bytes.len();
    let count = read_count(bytes, offset).ok_or(CodecError::TruncatedBuffer {
        section,
        needed: offset + COUNT_SIZE,
        available,
    })?;
    let layout = VmdSection::fixed(offset + COUNT_SIZE, count, record_size);
    if layout.end() > available {
        return Err(CodecError::TruncatedBuffer {
            section,
            needed: layout.end(),
            available,
        });
    }
    Ok(layout)
}

fn scan_optional(bytes: &[u8], offset: usize, record_size: usize) -> Option<VmdSection> {
    let count = read_count(bytes, offset)?;
    let layout = VmdSection::fixed(offset + COUNT_SIZE, count, record_size);
    (layout.end() <= bytes.len()).then_some(layout)
}

fn scan_ik(bytes: &[u8], offset: usize) -> Option<VmdSection> {
    let count = read_count(bytes, offset)?;
    let begin = offset + COUNT_SIZE;
    let mut cursor = begin;
    for _ in 0..count {
        let states = read_count(bytes, cursor.checked_add(5)?)?;
        let record = states
            .checked_mul(IK_STATE_SIZE)?
            .checked_add(IK_RECORD_HEADER_SIZE)?;
        cursor = cursor.checked_add(record)?;
        if cursor > bytes.len() {
            return None;
        }
    }
    Some(VmdSection {
        begin,
        count,
        record_size: IK_RECORD_HEADER_SIZE,
        total: cursor - begin,
    })
}

// ============================================================================
// 记录
// ============================================================================

/// VMD 文件头
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VmdHeader {
    pub signature: String,
    pub model_name: String,
    pub new_format: bool,
}

impl VmdHeader {
    /// 签名是否为已知的两种之一
    pub fn is_valid(&self) -> bool {
        let signature = self.signature.as_bytes();
        signature == VMD_HEADER_V1 || signature == VMD_HEADER_V2
    }
}

/// 骨骼关键帧
#[derive(Debug, Clone, PartialEq)]
pub struct VmdBoneKey {
    pub name: String,
    pub frame: u32,
    pub position: Vec3,
    pub rotation: Quat,
    /// 插值参数 (64 字节)
    pub interpolation: [u8; 64],
}

impl VmdBoneKey {
    /// 提取 x, y, z, 旋转 四条曲线
    ///
    /// VMD 插值数据布局：每行 16 字节，共 4 行，只读第一行
    /// 每行格式：X_x1, Y_x1, Z_x1, R_x1, X_y1, Y_y1, Z_y1, R_y1, ...
    pub fn curves(&self) -> [BezierCurve; 4] {
        let p = &self.interpolation;
        std::array::from_fn(|axis| {
            BezierCurve::from_parameters([p[axis], p[axis + 4], p[axis + 8], p[axis + 12]])
        })
    }

    /// 用四条曲线生成标准的 4 行插值块
    pub fn interpolation_from_curves(curves: &[BezierCurve; 4]) -> [u8; 64] {
        let mut row = [0u8; 16];
        for (axis, curve) in curves.iter().enumerate() {
            let [x1, y1, x2, y2] = curve.to_parameters();
            row[axis] = x1;
            row[axis + 4] = y1;
            row[axis + 8] = x2;
            row[axis + 12] = y2;
        }
        // 后续各行为前一行左移一字节
        let mut block = [0u8; 64];
        for line in 0..4 {
            for i in 0..16 - line {
                block[line * 16 + i] = row[i + line];
            }
        }
        block
    }
}

/// Morph 关键帧
#[derive(Debug, Clone, PartialEq)]
pub struct VmdMorphKey {
    pub name: String,
    pub frame: u32,
    pub weight: f32,
}

/// 相机插值曲线
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VmdCameraCurves {
    pub x: BezierCurve,
    pub y: BezierCurve,
    pub z: BezierCurve,
    pub rotation: BezierCurve,
    pub distance: BezierCurve,
    pub fov: BezierCurve,
}

/// 相机关键帧
#[derive(Debug, Clone, PartialEq)]
pub struct VmdCameraKey {
    pub frame: u32,
    /// 目标到相机的距离
    pub distance: f32,
    /// 目标位置
    pub target: Vec3,
    /// 相机旋转（欧拉角，弧度）
    pub rotation: Vec3,
    /// 插值参数 (24 字节)，每组顺序为 x1, x2, y1, y2
    pub interpolation: [u8; 24],
    /// 视角（度）
    pub fov: u32,
    pub perspective: bool,
}

impl VmdCameraKey {
    pub fn curves(&self) -> VmdCameraCurves {
        let p = &self.interpolation;
        let group = |g: usize| {
            let b = &p[g * 4..g * 4 + 4];
            BezierCurve::new(
                b[0] as f32 / 127.0,
                b[1] as f32 / 127.0,
                b[2] as f32 / 127.0,
                b[3] as f32 / 127.0,
            )
        };
        VmdCameraCurves {
            x: group(0),
            y: group(1),
            z: group(2),
            rotation: group(3),
            distance: group(4),
            fov: group(5),
        }
    }
}

/// IK 开关条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmdIkState {
    pub name: String,
    pub enabled: bool,
}

/// IK 开关关键帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmdIkKey {
    pub frame: u32,
    pub shown: bool,
    pub states: Vec<VmdIkState>,
}

// ============================================================================
// 文件
// ============================================================================

/// VMD 文件数据（原始坐标系，未做任何轴向修正）
#[derive(Debug, Clone, PartialEq)]
pub struct VmdFile {
    pub header: VmdHeader,
    pub bones: Vec<VmdBoneKey>,
    pub morphs: Vec<VmdMorphKey>,
    pub cameras: Vec<VmdCameraKey>,
    pub iks: Vec<VmdIkKey>,
    pub layout: VmdLayout,
}

impl VmdFile {
    /// 从文件路径加载 VMD
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::parse(&bytes)
    }

    /// 从字节切片解析 VMD
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let layout = VmdLayout::scan(bytes)?;
        let available = bytes.len();
        let mut reader = Cursor::new(bytes);

        let header = read_header(&mut reader, &layout)
            .map_err(|_| truncated("header", layout.header_size, available))?;
        if !header.is_valid() {
            log::warn!("Unknown VMD signature '{}', parsing anyway", header.signature);
        }

        let bones = read_section(&mut reader, &layout.bone, read_bone_key)
            .map_err(|_| truncated("bone", layout.bone.end(), available))?;
        let morphs = read_section(&mut reader, &layout.morph, read_morph_key)
            .map_err(|_| truncated("morph", layout.morph.end(), available))?;
        let cameras = read_section(&mut reader, &layout.camera, read_camera_key)
            .map_err(|_| truncated("camera", layout.camera.end(), available))?;

        // 光照与阴影不使用，直接跳过
        let iks = match &layout.ik {
            Some(section) => read_section(&mut reader, section, read_ik_key)
                .map_err(|_| truncated("ik", section.end(), available))?,
            None => {
                if layout.light.is_none() || layout.shadow.is_none() {
                    log::debug!("VMD trailing sections absent after camera section");
                }
                Vec::new()
            }
        };

        log::info!(
            "Loaded VMD '{}': {} bone keys, {} morph keys, {} camera keys, {} IK keys",
            header.model_name,
            bones.len(),
            morphs.len(),
            cameras.len(),
            iks.len()
        );

        Ok(Self {
            header,
            bones,
            morphs,
            cameras,
            iks,
            layout,
        })
    }

    /// 各段记录数量
    pub fn counts(&self) -> VmdCounts {
        VmdCounts {
            bones: self.bones.len(),
            morphs: self.morphs.len(),
            cameras: self.cameras.len(),
            lights: self.layout.light.map(|s| s.count),
            shadows: self.layout.shadow.map(|s| s.count),
            ik_states: self
                .layout
                .ik
                .map(|_| self.iks.iter().map(|k| k.states.len()).collect()),
        }
    }

    /// 获取最大帧数
    pub fn max_frame(&self) -> u32 {
        let bones = self.bones.iter().map(|k| k.frame);
        let morphs = self.morphs.iter().map(|k| k.frame);
        let cameras = self.cameras.iter().map(|k| k.frame);
        bones.chain(morphs).chain(cameras).max().unwrap_or(0)
    }

    /// 编码为 VMD
    ///
    /// 光照与阴影段写为空段，IK 段始终写出。
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let (signature, name_size) = if self.header.new_format {
            (VMD_HEADER_V2, MODEL_NAME_SIZE)
        } else {
            (VMD_HEADER_V1, MODEL_NAME_SIZE_OLD)
        };
        let mut signature_field = [0u8; SIGNATURE_SIZE];
        signature_field[..signature.len()].copy_from_slice(signature);
        writer.write_all(&signature_field)?;
        write_shift_jis(writer, &self.header.model_name, name_size)?;

        writer.write_u32::<LittleEndian>(self.bones.len() as u32)?;
        for key in &self.bones {
            write_shift_jis(writer, &key.name, BONE_NAME_SIZE)?;
            writer.write_u32::<LittleEndian>(key.frame)?;
            write_vec3(writer, key.position)?;
            for v in key.rotation.to_array() {
                writer.write_f32::<LittleEndian>(v)?;
            }
            writer.write_all(&key.interpolation)?;
        }

        writer.write_u32::<LittleEndian>(self.morphs.len() as u32)?;
        for key in &self.morphs {
            write_shift_jis(writer, &key.name, MORPH_NAME_SIZE)?;
            writer.write_u32::<LittleEndian>(key.frame)?;
            writer.write_f32::<LittleEndian>(key.weight)?;
        }

        writer.write_u32::<LittleEndian>(self.cameras.len() as u32)?;
        for key in &self.cameras {
            writer.write_u32::<LittleEndian>(key.frame)?;
            writer.write_f32::<LittleEndian>(key.distance)?;
            write_vec3(writer, key.target)?;
            write_vec3(writer, key.rotation)?;
            writer.write_all(&key.interpolation)?;
            writer.write_u32::<LittleEndian>(key.fov)?;
            // 0 表示透视
            writer.write_u8(if key.perspective { 0 } else { 1 })?;
        }

        // 光照、阴影
        writer.write_u32::<LittleEndian>(0)?;
        writer.write_u32::<LittleEndian>(0)?;

        writer.write_u32::<LittleEndian>(self.iks.len() as u32)?;
        for key in &self.iks {
            writer.write_u32::<LittleEndian>(key.frame)?;
            writer.write_u8(key.shown as u8)?;
            writer.write_u32::<LittleEndian>(key.states.len() as u32)?;
            for state in &key.states {
                write_shift_jis(writer, &state.name, IK_NAME_SIZE)?;
                writer.write_u8(state.enabled as u8)?;
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }
}

fn truncated(section: &'static str, needed: usize, available: usize) -> CodecError {
    CodecError::TruncatedBuffer {
        section,
        needed,
        available,
    }
}

fn read_header<R: Read + Seek>(reader: &mut R, layout: &VmdLayout) -> io::Result<VmdHeader> {
    reader.seek(SeekFrom::Start(0))?;
    let mut signature = [0u8; SIGNATURE_SIZE];
    reader.read_exact(&mut signature)?;
    let mut model_name = vec![0u8; layout.header_size - SIGNATURE_SIZE];
    reader.read_exact(&mut model_name)?;

    let end = signature.iter().position(|&b| b == 0).unwrap_or(SIGNATURE_SIZE);
    Ok(VmdHeader {
        signature: String::from_utf8_lossy(&signature[..end]).into_owned(),
        model_name: decode_shift_jis(&model_name),
        new_format: layout.new_format,
    })
}

fn read_section<R, T>(
    reader: &mut R,
    section: &VmdSection,
    read_record: fn(&mut R) -> io::Result<T>,
) -> io::Result<Vec<T>>
where
    R: Read + Seek,
{
    reader.seek(SeekFrom::Start(section.begin as u64))?;
    (0..section.count).map(|_| read_record(reader)).collect()
}

/// 读取骨骼关键帧
fn read_bone_key<R: Read>(reader: &mut R) -> io::Result<VmdBoneKey> {
    let name = read_name::<_, BONE_NAME_SIZE>(reader)?;
    let frame = reader.read_u32::<LittleEndian>()?;
    let position = read_vec3(reader)?;

    // 旋转 (四元数 x, y, z, w)
    let rx = reader.read_f32::<LittleEndian>()?;
    let ry = reader.read_f32::<LittleEndian>()?;
    let rz = reader.read_f32::<LittleEndian>()?;
    let rw = reader.read_f32::<LittleEndian>()?;

    let mut interpolation = [0u8; 64];
    reader.read_exact(&mut interpolation)?;

    Ok(VmdBoneKey {
        name,
        frame,
        position,
        rotation: Quat::from_xyzw(rx, ry, rz, rw),
        interpolation,
    })
}

/// 读取 Morph 关键帧
fn read_morph_key<R: Read>(reader: &mut R) -> io::Result<VmdMorphKey> {
    let name = read_name::<_, MORPH_NAME_SIZE>(reader)?;
    let frame = reader.read_u32::<LittleEndian>()?;
    let weight = reader.read_f32::<LittleEndian>()?;
    Ok(VmdMorphKey { name, frame, weight })
}

/// 读取相机关键帧
fn read_camera_key<R: Read>(reader: &mut R) -> io::Result<VmdCameraKey> {
    let frame = reader.read_u32::<LittleEndian>()?;
    let distance = reader.read_f32::<LittleEndian>()?;
    let target = read_vec3(reader)?;
    let rotation = read_vec3(reader)?;
    let mut interpolation = [0u8; 24];
    reader.read_exact(&mut interpolation)?;
    let fov = reader.read_u32::<LittleEndian>()?;
    let perspective = reader.read_u8()? == 0;
    Ok(VmdCameraKey {
        frame,
        distance,
        target,
        rotation,
        interpolation,
        fov,
        perspective,
    })
}

/// 读取 IK 开关关键帧
fn read_ik_key<R: Read>(reader: &mut R) -> io::Result<VmdIkKey> {
    let frame = reader.read_u32::<LittleEndian>()?;
    let shown = reader.read_u8()? == 1;
    let count = reader.read_u32::<LittleEndian>()?;
    let states = (0..count)
        .map(|_| {
            let name = read_name::<_, IK_NAME_SIZE>(reader)?;
            let enabled = reader.read_u8()? == 1;
            Ok(VmdIkState { name, enabled })
        })
        .collect::<io::Result<Vec<_>>>()?;
    Ok(VmdIkKey { frame, shown, states })
}

fn read_name<R: Read, const N: usize>(reader: &mut R) -> io::Result<String> {
    let mut bytes = [0u8; N];
    reader.read_exact(&mut bytes)?;
    Ok(decode_shift_jis(&bytes))
}

fn read_vec3<R: Read>(reader: &mut R) -> io::Result<Vec3> {
    let x = reader.read_f32::<LittleEndian>()?;
    let y = reader.read_f32::<LittleEndian>()?;
    let z = reader.read_f32::<LittleEndian>()?;
    Ok(Vec3::new(x, y, z))
}

fn write_vec3<W: Write>(writer: &mut W, v: Vec3) -> io::Result<()> {
    writer.write_f32::<LittleEndian>(v.x)?;
    writer.write_f32::<LittleEndian>(v.y)?;
    writer.write_f32::<LittleEndian>(v.z)
}

/// 解码 Shift-JIS 字符串
fn decode_shift_jis(bytes: &[u8]) -> String {
    // 找到第一个 null 字节
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let (decoded, _, _) = encoding_rs::SHIFT_JIS.decode(&bytes[..end]);
    decoded.into_owned()
}

/// 编码为定长 Shift-JIS 字段，不足补 0，超长截断
fn write_shift_jis<W: Write>(writer: &mut W, text: &str, width: usize) -> io::Result<()> {
    let (encoded, _, _) = encoding_rs::SHIFT_JIS.encode(text);
    let mut field = vec![0u8; width];
    let len = encoded.len().min(width);
    field[..len].copy_from_slice(&encoded[..len]);
    writer.write_all(&field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MotionError;

    fn bone_key(name: &str, frame: u32) -> VmdBoneKey {
        VmdBoneKey {
            name: name.to_string(),
            frame,
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_y(0.5),
            interpolation: VmdBoneKey::interpolation_from_curves(&[BezierCurve::LINEAR; 4]),
        }
    }

    fn sample_file() -> VmdFile {
        let iks = vec![
            VmdIkKey {
                frame: 0,
                shown: true,
                states: vec![
                    VmdIkState { name: "右足ＩＫ".to_string(), enabled: true },
                    VmdIkState { name: "左足ＩＫ".to_string(), enabled: false },
                ],
            },
            VmdIkKey {
                frame: 10,
                shown: true,
                states: vec![VmdIkState { name: "右足ＩＫ".to_string(), enabled: false }],
            },
        ];
        let file = VmdFile {
            header: VmdHeader {
                signature: String::from_utf8_lossy(VMD_HEADER_V2).into_owned(),
                model_name: "初音ミク".to_string(),
                new_format: true,
            },
            bones: vec![bone_key("センター", 0), bone_key("上半身", 5), bone_key("センター", 30)],
            morphs: vec![VmdMorphKey { name: "まばたき".to_string(), frame: 3, weight: 1.0 }],
            cameras: vec![VmdCameraKey {
                frame: 0,
                distance: -45.0,
                target: Vec3::new(0.0, 10.0, 0.0),
                rotation: Vec3::new(0.1, 0.2, 0.0),
                interpolation: [20; 24],
                fov: 30,
                perspective: true,
            }],
            iks,
            layout: VmdLayout::from_counts(true, &VmdCounts::default()),
        };
        let bytes = file.to_bytes().unwrap();
        VmdFile::parse(&bytes).unwrap()
    }

    #[test]
    fn test_round_trip_layout() {
        let file = sample_file();
        assert_eq!(file.bones.len(), 3);
        assert_eq!(file.bones[1].name, "上半身");
        assert_eq!(file.morphs[0].name, "まばたき");
        assert_eq!(file.iks.len(), 2);
        assert_eq!(file.iks[0].states[0].name, "右足ＩＫ");
        assert!(file.iks[0].states[0].enabled);

        let recomputed = VmdLayout::from_counts(file.header.new_format, &file.counts());
        assert_eq!(recomputed, file.layout);
        assert_eq!(file.layout.bone.begin, 54);
        assert_eq!(file.layout.morph.begin, 54 + 3 * BONE_RECORD_SIZE + 4);
    }

    #[test]
    fn test_old_header_layout() {
        let mut file = sample_file();
        file.header.new_format = false;
        file.header.signature = String::from_utf8_lossy(VMD_HEADER_V1).into_owned();
        let parsed = VmdFile::parse(&file.to_bytes().unwrap()).unwrap();
        assert!(!parsed.layout.new_format);
        assert_eq!(parsed.layout.header_size, 40);
        assert_eq!(parsed.bones.len(), 3);
        assert_eq!(VmdLayout::from_counts(false, &parsed.counts()), parsed.layout);
    }

    #[test]
    fn test_truncated_trailing_section_is_absent() {
        let file = sample_file();
        let bytes = file.to_bytes().unwrap();
        // 去掉 IK 段最后一个字节
        let parsed = VmdFile::parse(&bytes[..bytes.len() - 1]).unwrap();
        assert!(parsed.layout.light.is_some());
        assert!(parsed.layout.ik.is_none());
        assert!(parsed.iks.is_empty());
        assert_eq!(parsed.bones.len(), 3);

        // 只保留到相机段结尾
        let parsed = VmdFile::parse(&bytes[..file.layout.camera.end()]).unwrap();
        assert!(parsed.layout.light.is_none());
        assert!(parsed.layout.shadow.is_none());
        assert!(parsed.layout.ik.is_none());
    }

    #[test]
    fn test_truncated_mandatory_section() {
        let file = sample_file();
        let bytes = file.to_bytes().unwrap();
        let cut = file.layout.bone.begin + BONE_RECORD_SIZE;
        match VmdFile::parse(&bytes[..cut]) {
            Err(MotionError::Codec(CodecError::TruncatedBuffer { section, available, .. })) => {
                assert_eq!(section, "bone");
                assert_eq!(available, cut);
            }
            other => panic!("expected truncated bone section, got {:?}", other),
        }

        assert!(matches!(
            VmdFile::parse(&bytes[..10]),
            Err(MotionError::Codec(CodecError::TruncatedBuffer { section: "header", .. }))
        ));
    }

    #[test]
    fn test_bone_curves_first_row() {
        let mut key = bone_key("センター", 0);
        key.interpolation = [0; 64];
        // X 曲线：x1, y1, x2, y2 分别位于 0, 4, 8, 12
        key.interpolation[0] = 127;
        key.interpolation[4] = 0;
        key.interpolation[8] = 0;
        key.interpolation[12] = 127;
        key.interpolation[3] = 64;
        let curves = key.curves();
        assert_eq!(curves[0], BezierCurve::new(1.0, 0.0, 0.0, 1.0));
        assert!((curves[3].x1 - 64.0 / 127.0).abs() < 1e-6);
    }

    #[test]
    fn test_camera_values() {
        let file = sample_file();
        let camera = &file.cameras[0];
        assert_eq!(camera.fov, 30);
        assert_eq!(camera.distance, -45.0);
        assert!(camera.perspective);
        let curves = camera.curves();
        assert!((curves.fov.x1 - 20.0 / 127.0).abs() < 1e-6);
    }
}
