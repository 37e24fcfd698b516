//! 动作库
//!
//! 批量加载在 rayon 线程池上并行执行。每个条目要么是不可变的
//! `Arc<SourceMotion>`，要么是记录错误信息的不可用条目；单个文件失败不影响其他条目。

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;

use crate::animation::{BvhFile, VmdFile};
use crate::config::RetargetConfig;
use crate::retarget::{BoneMapSet, BoneMapTable, SourceMotion};
use crate::skeleton::BoneSet;
use crate::{MotionError, Result};

/// VMD 默认使用的映射表
pub const DEFAULT_VMD_MAP: &str = "Vocaloid";

/// 动作来源
#[derive(Debug, Clone)]
pub enum MotionSource {
    BvhText(String),
    VmdBytes(Vec<u8>),
    /// 按扩展名判断格式
    File(PathBuf),
}

/// 加载请求
#[derive(Debug, Clone)]
pub struct MotionRequest {
    pub name: String,
    pub source: MotionSource,
}

impl MotionRequest {
    pub fn new(name: impl Into<String>, source: MotionSource) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }
}

/// 库条目
#[derive(Debug, Clone)]
pub enum LibraryEntry {
    Ready(Arc<SourceMotion>),
    Unavailable(String),
}

impl LibraryEntry {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// 动作库
pub struct MotionLibrary {
    maps: BoneMapSet,
    vmd_map: String,
    /// VMD 源模型骨骼（规范名称），用于 Center 与 IK 偏移
    donor: Option<BoneSet>,
    config: RetargetConfig,
    entries: BTreeMap<String, LibraryEntry>,
}

impl MotionLibrary {
    pub fn new(maps: BoneMapSet, config: RetargetConfig) -> Self {
        Self {
            maps,
            vmd_map: DEFAULT_VMD_MAP.to_string(),
            donor: None,
            config,
            entries: BTreeMap::new(),
        }
    }

    pub fn with_vmd_map(mut self, name: impl Into<String>) -> Self {
        self.vmd_map = name.into();
        self
    }

    pub fn with_donor(mut self, donor: BoneSet) -> Self {
        self.donor = Some(donor);
        self
    }

    pub fn maps(&self) -> &BoneMapSet {
        &self.maps
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entry(&self, name: &str) -> Option<&LibraryEntry> {
        self.entries.get(name)
    }

    /// 获取已加载的动作
    pub fn get(&self, name: &str) -> Result<Arc<SourceMotion>> {
        match self.entries.get(name) {
            Some(LibraryEntry::Ready(motion)) => Ok(Arc::clone(motion)),
            Some(LibraryEntry::Unavailable(reason)) => {
                Err(MotionError::ClipUnavailable(format!("{}: {}", name, reason)))
            }
            None => Err(MotionError::ClipUnavailable(format!("{}: not loaded", name))),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<LibraryEntry> {
        self.entries.remove(name)
    }

    /// 直接加入已构建的动作
    pub fn insert(&mut self, motion: SourceMotion) -> Arc<SourceMotion> {
        let motion = Arc::new(motion);
        self.entries
            .insert(motion.name.clone(), LibraryEntry::Ready(Arc::clone(&motion)));
        motion
    }

    /// 加载单个动作
    pub fn load(&mut self, request: MotionRequest) -> Result<Arc<SourceMotion>> {
        let name = request.name.clone();
        let entry = self.build_entry(&request);
        self.entries.insert(name.clone(), entry);
        self.get(&name)
    }

    /// 并行加载，返回成功数量
    pub fn load_batch(&mut self, requests: Vec<MotionRequest>) -> usize {
        let loaded: Vec<(String, LibraryEntry)> = requests
            .par_iter()
            .map(|request| (request.name.clone(), self.build_entry(request)))
            .collect();

        let ready = loaded.iter().filter(|(_, entry)| entry.is_ready()).count();
        log::info!("Loaded {}/{} motions", ready, loaded.len());
        self.entries.extend(loaded);
        ready
    }

    fn build_entry(&self, request: &MotionRequest) -> LibraryEntry {
        match self.build(request) {
            Ok(motion) => {
                log::info!(
                    "Motion '{}' ready: {} tracks, {:.2}s, {} warnings",
                    motion.name,
                    motion.clip.tracks.len(),
                    motion.duration(),
                    motion.warnings.len()
                );
                LibraryEntry::Ready(Arc::new(motion))
            }
            Err(e) => {
                log::warn!("Motion '{}' unavailable: {}", request.name, e);
                LibraryEntry::Unavailable(e.to_string())
            }
        }
    }

    fn build(&self, request: &MotionRequest) -> Result<SourceMotion> {
        let name = request.name.as_str();
        match &request.source {
            MotionSource::BvhText(text) => Ok(SourceMotion::from_bvh(name, &BvhFile::parse(text, &self.maps)?)),
            MotionSource::VmdBytes(bytes) => self.build_vmd(name, &VmdFile::parse(bytes)?),
            MotionSource::File(path) => {
                let is_vmd = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("vmd"));
                if is_vmd {
                    self.build_vmd(name, &VmdFile::load(path)?)
                } else {
                    let text = fs::read_to_string(path)?;
                    Ok(SourceMotion::from_bvh(name, &BvhFile::parse(&text, &self.maps)?))
                }
            }
        }
    }

    fn build_vmd(&self, name: &str, vmd: &VmdFile) -> Result<SourceMotion> {
        let table = self.vmd_table();
        Ok(SourceMotion::from_vmd(name, vmd, table, &self.config, self.donor.as_ref()))
    }

    /// 配置的映射表，缺失时按 VMD 的下半身骨骼检测
    fn vmd_table(&self) -> &BoneMapTable {
        match self.maps.get(&self.vmd_map) {
            Some(table) => table,
            None => self.maps.detect("下半身").table,
        }
    }
}
