use crate::constants::{MARKET_INDICES, VN30_SYMBOLS};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Named symbol lists loaded from a JSON object of `{"GROUP": ["SYM", ...]}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerGroups {
    #[serde(flatten)]
    pub groups: HashMap<String, Vec<String>>,
}

impl TickerGroups {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("cannot read groups file {}: {}", path.display(), e))
        })?;
        let groups: HashMap<String, Vec<String>> = serde_json::from_str(&content)?;
        Ok(Self { groups })
    }

    /// Group lookup, case-insensitive on the group name
    pub fn get_group(&self, group_name: &str) -> Option<&Vec<String>> {
        self.groups.get(group_name).or_else(|| {
            self.groups
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(group_name))
                .map(|(_, symbols)| symbols)
        })
    }

    pub fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Where the symbols of a run come from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SymbolSource {
    /// Built-in VN30 basket
    #[default]
    Vn30,
    /// Explicit list
    List(Vec<String>),
    /// A group of a JSON groups file
    Group { file: PathBuf, name: String },
}

impl SymbolSource {
    /// Parse a comma-separated list such as `FPT, hpg,VCB`
    pub fn from_list(list: &str) -> Self {
        SymbolSource::List(list.split(',').map(|s| s.to_string()).collect())
    }

    /// Symbols in run order: upper-cased, blanks dropped, first occurrence kept
    pub fn resolve(&self) -> Result<Vec<String>> {
        let raw: Vec<String> = match self {
            SymbolSource::Vn30 => VN30_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            SymbolSource::List(symbols) => symbols.clone(),
            SymbolSource::Group { file, name } => {
                let groups = TickerGroups::from_file(file)?;
                groups.get_group(name).cloned().ok_or_else(|| {
                    AppError::InvalidInput(format!(
                        "group '{}' not found in {} (available: {})",
                        name,
                        file.display(),
                        groups.group_names().join(", ")
                    ))
                })?
            }
        };

        let mut seen = HashSet::new();
        let symbols: Vec<String> = raw
            .into_iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();

        if symbols.is_empty() {
            return Err(AppError::InvalidInput("symbol list is empty".to_string()));
        }
        Ok(symbols)
    }
}

/// A market index as stored (`code`) and as requested upstream (`upstream_code`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTicker {
    pub code: String,
    pub upstream_code: String,
}

impl IndexTicker {
    pub fn new(code: &str, upstream_code: &str) -> Self {
        Self {
            code: code.to_string(),
            upstream_code: upstream_code.to_string(),
        }
    }

    pub fn all() -> Vec<Self> {
        MARKET_INDICES
            .iter()
            .map(|(code, upstream)| Self::new(code, upstream))
            .collect()
    }

    /// Known indices matching `codes` (storage code, case-insensitive), in the given order
    pub fn resolve(codes: &[String]) -> Result<Vec<Self>> {
        let known = Self::all();
        codes
            .iter()
            .map(|code| {
                known
                    .iter()
                    .find(|i| i.code.eq_ignore_ascii_case(code.trim()))
                    .cloned()
                    .ok_or_else(|| {
                        AppError::InvalidInput(format!(
                            "unknown index '{}' (known: {})",
                            code,
                            known.iter().map(|i| i.code.as_str()).collect::<Vec<_>>().join(", ")
                        ))
                    })
            })
            .collect()
    }
}
