// ==========================================
// MES 停机核心 - 停机原因目录
// ==========================================
// 职责: 原因文本 → 停机类别 的静态映射表
// 存储: JSON（内置默认表 downtime_reasons.json，可由外部文件覆盖）
// 规则: 先查别名，再查类别列表；未识别原因归入 OTHER
// ==========================================

use crate::domain::types::DowntimeCategory;
use crate::error::{MesError, MesResult, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// 内置默认原因表
const BUILTIN_CATALOG: &str = include_str!("downtime_reasons.json");

/// 原因目录的持久化形态
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasonCatalogFile {
    /// 类别 → 原因列表
    #[serde(default)]
    pub categories: BTreeMap<DowntimeCategory, Vec<String>>,

    /// 特殊原因直接映射（优先于类别列表）
    #[serde(default)]
    pub aliases: BTreeMap<String, DowntimeCategory>,
}

/// 原因目录（带查找索引）
#[derive(Debug, Clone)]
pub struct ReasonCatalog {
    file: ReasonCatalogFile,
    index: HashMap<String, DowntimeCategory>,
}

fn normalize_reason(reason: &str) -> String {
    reason.trim().to_uppercase()
}

impl ReasonCatalog {
    /// 从持久化形态构建索引
    pub fn from_file_model(file: ReasonCatalogFile) -> Self {
        let mut index = HashMap::new();

        for (category, reasons) in &file.categories {
            for reason in reasons {
                let key = normalize_reason(reason);
                if let Some(existing) = index.get(&key) {
                    tracing::warn!(
                        "原因在多个类别中重复，保留首个: reason={}, kept={}, ignored={}",
                        key,
                        existing,
                        category
                    );
                    continue;
                }
                index.insert(key, *category);
            }
        }

        // 别名覆盖类别列表
        for (alias, category) in &file.aliases {
            index.insert(normalize_reason(alias), *category);
        }

        Self { file, index }
    }

    /// 内置默认表
    pub fn builtin() -> Self {
        // 内置表随源码编译，解析失败属于构建缺陷；此处回退为空表而不是 panic
        match Self::from_json(BUILTIN_CATALOG) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::error!("内置原因表解析失败: {}", e);
                Self::from_file_model(ReasonCatalogFile::default())
            }
        }
    }

    pub fn from_json(raw: &str) -> MesResult<Self> {
        let file: ReasonCatalogFile = serde_json::from_str(raw)?;
        Ok(Self::from_file_model(file))
    }

    /// 从外部 JSON 文件加载
    pub fn load(path: &Path) -> MesResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MesError::from(ValidationError::InvalidConfig {
                key: "reason_catalog_path".to_string(),
                message: format!("{}: {}", path.display(), e),
            })
        })?;
        let catalog = Self::from_json(&raw)?;
        tracing::info!(
            "停机原因目录已加载: path={}, reasons={}",
            path.display(),
            catalog.len()
        );
        Ok(catalog)
    }

    /// 原因 → 类别（未识别为 OTHER）
    pub fn category_for(&self, reason: &str) -> DowntimeCategory {
        let key = normalize_reason(reason);
        if key.is_empty() {
            return DowntimeCategory::Other;
        }
        self.index
            .get(&key)
            .copied()
            .unwrap_or(DowntimeCategory::Other)
    }

    /// 某类别下的原因列表（供表单下拉）
    pub fn reasons_for(&self, category: DowntimeCategory) -> &[String] {
        self.file
            .categories
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 已索引的原因数量（含别名）
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl Default for ReasonCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
