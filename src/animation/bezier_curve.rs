//! 贝塞尔曲线
//!
//! 复现 MMD 关键帧的三次贝塞尔缓动：二分法反求参数 t，再计算 y。

use glam::Vec2;

/// 曲线 trait
pub trait Curve {
    fn value(&self, v: f32) -> f32;
}

/// 三次贝塞尔缓动曲线
///
/// 端点固定为 (0,0) 与 (1,1)，控制点为 (x1,y1) 与 (x2,y2)，均归一化到 0-1。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BezierCurve {
    pub x1: f32,
    pub x2: f32,
    pub y1: f32,
    pub y2: f32,
}

impl Default for BezierCurve {
    fn default() -> Self {
        Self::LINEAR
    }
}

impl BezierCurve {
    /// 线性曲线（控制点落在对角线上）
    pub const LINEAR: Self = Self { x1: 0.0, x2: 1.0, y1: 0.0, y2: 1.0 };

    /// 反求 t 的最大迭代次数
    const MAX_ITERATIONS: u32 = 15;
    /// 反求 t 的精度
    const EPSILON: f32 = 1e-5;

    /// 按 (x1, x2, y1, y2) 顺序创建
    pub fn new(x1: f32, x2: f32, y1: f32, y2: f32) -> Self {
        Self { x1, x2, y1, y2 }
    }

    /// 由两个控制点创建
    pub fn from_points(c0: Vec2, c1: Vec2) -> Self {
        Self::new(c0.x, c1.x, c0.y, c1.y)
    }

    /// 从 VMD 参数创建贝塞尔曲线
    ///
    /// VMD 使用 [0, 127] 范围的控制点参数，顺序为 x1, y1, x2, y2
    pub fn from_parameters(parameters: [u8; 4]) -> Self {
        Self::new(
            parameters[0] as f32 / 127.0,
            parameters[2] as f32 / 127.0,
            parameters[1] as f32 / 127.0,
            parameters[3] as f32 / 127.0,
        )
    }

    /// 导出为 VMD 参数格式
    pub fn to_parameters(&self) -> [u8; 4] {
        let quantize = |v: f32| (v.clamp(0.0, 1.0) * 127.0).round() as u8;
        [quantize(self.x1), quantize(self.y1), quantize(self.x2), quantize(self.y2)]
    }

    /// 控制点是否落在对角线上
    pub fn is_linear(&self) -> bool {
        (self.x1 - self.y1).abs() < f32::EPSILON && (self.x2 - self.y2).abs() < f32::EPSILON
    }

    /// 计算缓动进度
    ///
    /// 从 t = 0.5 开始二分，步长每次减半，最多 15 次或误差小于 1e-5 时停止。
    pub fn ease(&self, x: f32) -> f32 {
        if x <= 0.0 {
            return 0.0;
        }
        if x >= 1.0 {
            return 1.0;
        }

        let mut c = 0.5;
        let mut t = c;
        let mut s = 1.0 - t;
        let (mut sst3, mut stt3, mut ttt) = (0.0, 0.0, 0.0);

        for _ in 0..Self::MAX_ITERATIONS {
            sst3 = 3.0 * s * s * t;
            stt3 = 3.0 * s * t * t;
            ttt = t * t * t;

            let ft = sst3 * self.x1 + stt3 * self.x2 + ttt - x;
            if ft.abs() < Self::EPSILON {
                break;
            }
            c /= 2.0;
            t += if ft < 0.0 { c } else { -c };
            s = 1.0 - t;
        }

        sst3 * self.y1 + stt3 * self.y2 + ttt
    }

    /// 两个关键帧之间的缓动权重
    ///
    /// 间隔小于 `snap_seconds` 时直接吸附到前一帧（权重 0）。
    pub fn weight(&self, t0: f32, t1: f32, t: f32, snap_seconds: f32) -> f32 {
        let span = t1 - t0;
        if span < snap_seconds {
            return 0.0;
        }
        self.ease((t - t0) / span)
    }
}

impl Curve for BezierCurve {
    fn value(&self, v: f32) -> f32 {
        self.ease(v)
    }
}
