//! CCD IK 求解器
//!
//! 每帧在轨道采样之后运行：
//! - 按声明顺序逐个旋转链节点，使末端指向目标
//! - 每个节点旋转后立即更新子树世界矩阵
//! - 一整轮没有任何旋转时提前结束

use glam::{EulerRot, Quat, Vec3};

use crate::Result;

use super::bone_set::{BoneSet, HumanoidMap};
use super::ik_chain::IkChain;
use super::pose::Pose;

/// 小于此角度视为已对齐
const ANGLE_EPSILON: f32 = 1e-5;

/// 单次求解的统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SolveReport {
    /// 实际执行的迭代轮数
    pub iterations: u32,
    /// 节点旋转次数
    pub rotations: u32,
    /// 因向量退化被跳过的节点次数
    pub degenerate: u32,
    /// 是否因一整轮无旋转而提前结束
    pub converged: bool,
}

/// 绑定到具体骨骼索引的 IK 链
#[derive(Clone, Debug)]
pub struct CcdSolver {
    pub chain: IkChain,
    target: usize,
    effector: usize,
    links: Vec<usize>,
}

impl CcdSolver {
    /// 解析链中的骨骼名称
    pub fn bind(chain: IkChain, skeleton: &BoneSet, names: &HumanoidMap) -> Result<Self> {
        let target = skeleton.require(names.resolve(&chain.target))?;
        let effector = skeleton.require(names.resolve(&chain.effector))?;
        let links = chain
            .links
            .iter()
            .map(|link| skeleton.require(names.resolve(&link.bone)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            chain,
            target,
            effector,
            links,
        })
    }

    #[inline]
    pub fn target_name(&self) -> &str {
        &self.chain.target
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.chain.is_enabled()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.chain.set_enabled(enabled);
    }

    /// 求解 IK，直接修改姿态中的局部旋转
    pub fn solve(&self, skeleton: &BoneSet, pose: &mut Pose) -> SolveReport {
        let mut report = SolveReport::default();
        if !self.is_enabled() {
            return report;
        }

        let target_pos = pose.world_position(self.target);

        for _ in 0..self.chain.iteration {
            report.iterations += 1;
            let mut rotated = false;

            for (link, &bone) in self.chain.links.iter().zip(&self.links) {
                if !link.enabled {
                    continue;
                }

                let link_pos = pose.world_position(bone);
                let inv_link = pose.world_rotation(bone).inverse();
                let effector_pos = pose.world_position(self.effector);

                let effector_vec = (inv_link * (effector_pos - link_pos)).try_normalize();
                let target_vec = (inv_link * (target_pos - link_pos)).try_normalize();
                let (Some(effector_vec), Some(target_vec)) = (effector_vec, target_vec) else {
                    report.degenerate += 1;
                    log::trace!("IK {}: zero-length vector at link {}", self.chain.target, link.bone);
                    continue;
                };

                let mut angle = target_vec.dot(effector_vec).clamp(-1.0, 1.0).acos();
                if angle.is_nan() {
                    report.degenerate += 1;
                    log::trace!("IK {}: NaN angle at link {}", self.chain.target, link.bone);
                    continue;
                }
                if angle < ANGLE_EPSILON {
                    continue;
                }
                if let Some(min) = self.chain.min_angle {
                    angle = angle.max(min);
                }
                if let Some(max) = self.chain.max_angle {
                    angle = angle.min(max);
                }

                let Some(axis) = effector_vec.cross(target_vec).try_normalize() else {
                    report.degenerate += 1;
                    log::trace!("IK {}: zero rotation axis at link {}", self.chain.target, link.bone);
                    continue;
                };

                let mut rotation = pose.rotations[bone] * Quat::from_axis_angle(axis, angle);

                // 轴限制：保留旋转角，强制旋转轴
                if let Some(limitation) = link.limitation {
                    let c = rotation.w.min(1.0);
                    let c2 = (1.0 - c * c).sqrt();
                    rotation = Quat::from_xyzw(
                        limitation.x * c2,
                        limitation.y * c2,
                        limitation.z * c2,
                        c,
                    );
                }
                if let Some(min) = link.rotation_min {
                    rotation = clamp_euler(rotation, |e| e.max(min));
                }
                if let Some(max) = link.rotation_max {
                    rotation = clamp_euler(rotation, |e| e.min(max));
                }

                pose.rotations[bone] = rotation;
                pose.update_subtree(skeleton, bone);
                report.rotations += 1;
                rotated = true;
            }

            if !rotated {
                report.converged = true;
                break;
            }
        }

        report
    }
}

/// 在 XYZ 欧拉角空间内限制旋转
fn clamp_euler(rotation: Quat, clamp: impl Fn(Vec3) -> Vec3) -> Quat {
    let (x, y, z) = rotation.to_euler(EulerRot::XYZ);
    let e = clamp(Vec3::new(x, y, z));
    Quat::from_euler(EulerRot::XYZ, e.x, e.y, e.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::ik_chain::IkLink;
    use crate::skeleton::BoneFlags;

    fn two_link(target: Vec3) -> BoneSet {
        let mut s = BoneSet::new();
        let e = BoneFlags::empty();
        s.add("Root", None, Vec3::ZERO, e).unwrap();
        s.add("Upper", Some("Root"), Vec3::ZERO, e).unwrap();
        s.add("Lower", Some("Upper"), Vec3::new(0.0, -1.0, 0.0), e).unwrap();
        s.add("Foot", Some("Lower"), Vec3::new(0.0, -1.0, 0.0), e).unwrap();
        s.add("Target", Some("Root"), target, e).unwrap();
        s
    }

    fn chain(iteration: u32, links: Vec<IkLink>) -> IkChain {
        let mut chain = IkChain {
            target: "Target".into(),
            effector: "Foot".into(),
            iteration,
            links,
            min_angle: None,
            max_angle: None,
        };
        chain.set_enabled(true);
        chain
    }

    fn distance(s: &BoneSet, pose: &Pose) -> f32 {
        pose.world_position(s.find("Foot").unwrap())
            .distance(pose.world_position(s.find("Target").unwrap()))
    }

    #[test]
    fn test_unreachable_target_does_not_diverge() {
        let s = two_link(Vec3::new(3.0, -1.0, 0.0));
        let solver = CcdSolver::bind(
            chain(1, vec![IkLink::new("Lower"), IkLink::new("Upper")]),
            &s,
            &HumanoidMap::new(),
        )
        .unwrap();

        let mut pose = Pose::rest(&s);
        let mut previous = distance(&s, &pose);
        for _ in 0..20 {
            solver.solve(&s, &mut pose);
            let current = distance(&s, &pose);
            assert!(current <= previous + 1e-4, "{} -> {}", previous, current);
            previous = current;
        }

        // 完全伸直并指向目标
        let reach = Vec3::new(3.0, -1.0, 0.0).length() - 2.0;
        assert!((previous - reach).abs() < 1e-2, "{} vs {}", previous, reach);
    }

    #[test]
    fn test_reachable_target_converges() {
        let s = two_link(Vec3::new(1.0, -1.2, 0.0));
        let solver = CcdSolver::bind(
            chain(40, vec![IkLink::new("Lower"), IkLink::new("Upper")]),
            &s,
            &HumanoidMap::new(),
        )
        .unwrap();
        let mut pose = Pose::rest(&s);
        let report = solver.solve(&s, &mut pose);
        assert!(report.rotations > 0);
        assert!(distance(&s, &pose) < 1e-2);
    }

    #[test]
    fn test_knee_limit() {
        let s = two_link(Vec3::new(0.0, -1.4, 0.8));
        let knee = IkLink::new("Lower").with_limits(Vec3::new(-std::f32::consts::PI, 0.0, 0.0), Vec3::ZERO);
        let solver = CcdSolver::bind(chain(40, vec![knee, IkLink::new("Upper")]), &s, &HumanoidMap::new()).unwrap();
        let mut pose = Pose::rest(&s);
        solver.solve(&s, &mut pose);

        let (x, y, z) = pose.rotations[s.find("Lower").unwrap()].to_euler(EulerRot::XYZ);
        assert!(x <= 1e-4 && x >= -std::f32::consts::PI - 1e-4);
        assert!(y.abs() < 1e-4 && z.abs() < 1e-4);
    }

    #[test]
    fn test_disabled_chain_is_noop() {
        let s = two_link(Vec3::new(3.0, -1.0, 0.0));
        let mut solver = CcdSolver::bind(
            chain(40, vec![IkLink::new("Lower"), IkLink::new("Upper")]),
            &s,
            &HumanoidMap::new(),
        )
        .unwrap();
        solver.set_enabled(false);
        let mut pose = Pose::rest(&s);
        let before = pose.clone();
        let report = solver.solve(&s, &mut pose);
        assert_eq!(report, SolveReport::default());
        assert_eq!(pose, before);
    }

    #[test]
    fn test_degenerate_link_is_skipped() {
        // 目标与节点重合
        let s = two_link(Vec3::ZERO);
        let solver = CcdSolver::bind(chain(5, vec![IkLink::new("Upper")]), &s, &HumanoidMap::new()).unwrap();
        let mut pose = Pose::rest(&s);
        let report = solver.solve(&s, &mut pose);
        assert!(report.degenerate > 0);
        assert!(report.converged);
        assert!(pose.rotations[1].abs_diff_eq(Quat::IDENTITY, 1e-6));
    }

    #[test]
    fn test_missing_bone_fails_bind() {
        let s = two_link(Vec3::ZERO);
        assert!(CcdSolver::bind(chain(1, vec![IkLink::new("Nope")]), &s, &HumanoidMap::new()).is_err());
    }
}
