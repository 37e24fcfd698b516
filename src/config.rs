//! 重定向与播放配置
//!
//! 所有参数扁平化，直接在代码中修改默认值即可。

use glam::Vec3;
use once_cell::sync::Lazy;
use std::sync::RwLock;

/// 重定向配置（扁平化，不嵌套）
#[derive(Debug, Clone)]
pub struct RetargetConfig {
    // ========== 时间 ==========
    /// 源动作帧率（VMD 帧号换算为秒），默认 30.0
    pub source_fps: f32,
    /// 贝塞尔吸附阈值（源帧数），两关键帧间隔小于此值时不插值，默认 1.5
    pub bezier_snap_frames: f32,

    // ========== 扭转修正 ==========
    /// 手臂扭转修正角度（度），默认 30.0
    pub twist_degrees: f32,

    // ========== 源骨骼偏移（VMD 无模型信息时使用）==========
    /// 源模型 Center 偏移，默认 (0, 12.7832, 0.5122)
    pub source_center_offset: Vec3,
    /// 右脚 IK 父骨骼偏移，左侧 x 取反
    pub source_foot_ik_parent_offset: Vec3,
    /// 脚 IK 相对父骨骼的偏移
    pub source_foot_ik_offset: Vec3,
    /// 脚尖 IK 相对脚 IK 的偏移
    pub source_toe_ik_offset: Vec3,

    // ========== 相机 ==========
    /// 相机位置缩放，默认 0.08
    pub camera_position_scale: f32,
    /// 相机高度偏移，默认 0.2
    pub camera_height_offset: f32,

    // ========== 播放 ==========
    /// 动作切换的交叉淡化时长（秒），默认 1.0
    pub crossfade_seconds: f32,
    /// 表情淡入淡出时长（秒），默认 0.1
    pub morph_transition_seconds: f32,

    // ========== IK ==========
    /// 脚 IK 迭代次数，默认 40
    pub foot_ik_iterations: u32,
    /// 脚尖 IK 迭代次数，默认 3
    pub toe_ik_iterations: u32,
    /// 源髋部高度低于此值时视为退化，默认 1e-4
    pub min_hip_height: f32,
}

impl Default for RetargetConfig {
    fn default() -> Self {
        Self {
            source_fps: 30.0,
            bezier_snap_frames: 1.5,

            twist_degrees: 30.0,

            // 标准 PMX 模型的静止姿态
            source_center_offset: Vec3::new(0.0, 12.7832, 0.5122),
            source_foot_ik_parent_offset: Vec3::new(-1.0130, 0.0, -0.6805),
            source_foot_ik_offset: Vec3::new(0.0, 0.9534, 0.0),
            source_toe_ik_offset: Vec3::new(0.0, -0.9534, 1.7651),

            camera_position_scale: 0.08,
            camera_height_offset: 0.2,

            crossfade_seconds: 1.0,
            morph_transition_seconds: 0.1,

            foot_ik_iterations: 40,
            toe_ik_iterations: 3,
            min_hip_height: 1e-4,
        }
    }
}

impl RetargetConfig {
    /// 贝塞尔吸附阈值（秒）
    #[inline]
    pub fn bezier_snap_seconds(&self) -> f32 {
        self.bezier_snap_frames / self.source_fps
    }

    /// 帧号转换为秒
    #[inline]
    pub fn frame_to_seconds(&self, frame: u32) -> f32 {
        frame as f32 / self.source_fps
    }
}

/// 全局配置实例
static RETARGET_CONFIG: Lazy<RwLock<RetargetConfig>> =
    Lazy::new(|| RwLock::new(RetargetConfig::default()));

/// 获取当前配置（克隆）
pub fn get_config() -> RetargetConfig {
    RETARGET_CONFIG
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

/// 替换当前配置
pub fn set_config(config: RetargetConfig) {
    let mut guard = RETARGET_CONFIG.write().unwrap_or_else(|e| e.into_inner());
    *guard = config;
}

/// 重置为默认配置
pub fn reset_config() {
    set_config(RetargetConfig::default());
}
