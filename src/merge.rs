use std::{collections::HashMap, fmt, ops::Index, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    block::{normalize_domain, DomainBlock},
    error::{Error, Result},
};

/// Policy used to resolve conflicting fields between two blocks for the same domain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MergePlan {
    /// Most restrictive wins.
    #[default]
    Max,
    /// Least restrictive wins.
    Min,
}

impl MergePlan {
    pub fn as_str(self) -> &'static str {
        match self {
            MergePlan::Max => "max",
            MergePlan::Min => "min",
        }
    }
}

impl FromStr for MergePlan {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "max" => Ok(MergePlan::Max),
            "min" => Ok(MergePlan::Min),
            _ => Err(Error::InvalidMergePlan(s.to_string())),
        }
    }
}

impl fmt::Display for MergePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MergePlan {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MergePlan {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

/// Combines two blocks for the same domain into a new one.
///
/// Severity and the boolean flags follow `plan`; comments are always unioned
/// with [`merge_comments`].
pub fn apply_mergeplan(a: &DomainBlock, b: &DomainBlock, plan: MergePlan) -> Result<DomainBlock> {
    if normalize_domain(&a.domain) != normalize_domain(&b.domain) {
        return Err(Error::DomainMismatch {
            left: a.domain.clone(),
            right: b.domain.clone(),
        });
    }

    let severity = match plan {
        MergePlan::Max => a.severity.max(b.severity),
        MergePlan::Min => a.severity.min(b.severity),
    };
    let combine = |x: bool, y: bool| match plan {
        MergePlan::Max => x || y,
        MergePlan::Min => x && y,
    };

    Ok(DomainBlock {
        domain: normalize_domain(&a.domain),
        severity,
        public_comment: non_empty(merge_comments(
            a.public_comment.as_deref(),
            b.public_comment.as_deref(),
        )),
        private_comment: non_empty(merge_comments(
            a.private_comment.as_deref(),
            b.private_comment.as_deref(),
        )),
        reject_media: combine(a.reject_media, b.reject_media),
        reject_reports: combine(a.reject_reports, b.reject_reports),
        obfuscate: combine(a.obfuscate, b.obfuscate),
    })
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

/// Unions two comma-separated comment lists, keeping the first occurrence of
/// every token.
///
/// Every comma is treated as a separator, so a comment cannot carry a literal
/// comma through a merge with a different comment.
pub fn merge_comments(a: Option<&str>, b: Option<&str>) -> String {
    let a = a.unwrap_or_default();
    let b = b.unwrap_or_default();

    match (a.is_empty(), b.is_empty()) {
        (true, true) => return String::new(),
        (false, true) => return a.to_string(),
        (true, false) => return b.to_string(),
        (false, false) if a == b => return a.to_string(),
        (false, false) => {}
    }

    let mut tokens: Vec<&str> = Vec::new();
    for token in a.split(',').chain(b.split(',')).map(str::trim) {
        if !token.is_empty() && !tokens.contains(&token) {
            tokens.push(token);
        }
    }

    tokens.join(", ")
}

/// Merged blocks keyed by normalized domain, iterated in first-seen order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Blocklist {
    blocks: Vec<DomainBlock>,
    index: HashMap<String, usize>,
}

impl Blocklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.index.contains_key(&normalize_domain(domain))
    }

    pub fn get(&self, domain: &str) -> Option<&DomainBlock> {
        self.index
            .get(&normalize_domain(domain))
            .map(|&i| &self.blocks[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &DomainBlock> + '_ {
        self.blocks.iter()
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> + '_ {
        self.blocks.iter().map(|b| b.domain.as_str())
    }

    pub fn into_blocks(self) -> Vec<DomainBlock> {
        self.blocks
    }

    /// Folds `block` into the list, merging with any existing entry for the same domain.
    pub fn insert(&mut self, block: DomainBlock, plan: MergePlan) -> Result<()> {
        let domain = normalize_domain(&block.domain);
        match self.index.get(&domain) {
            Some(&i) => {
                let merged = apply_mergeplan(&self.blocks[i], &block, plan)?;
                tracing::trace!(domain = %domain, severity = %merged.severity, "merged duplicate block");
                self.blocks[i] = merged;
            }
            None => {
                let block = DomainBlock { domain, ..block };
                self.index.insert(block.domain.clone(), self.blocks.len());
                self.blocks.push(block);
            }
        }

        Ok(())
    }

    pub fn remove(&mut self, domain: &str) -> Option<DomainBlock> {
        let i = self.index.remove(&normalize_domain(domain))?;
        let removed = self.blocks.remove(i);
        for idx in self.index.values_mut() {
            if *idx > i {
                *idx -= 1;
            }
        }
        Some(removed)
    }

    /// Drops every allowlisted domain, returning how many entries were removed.
    pub fn apply_allowlist<'a>(&mut self, allowlist: impl IntoIterator<Item = &'a str>) -> usize {
        let mut removed = 0;
        for domain in allowlist {
            if self.remove(domain).is_some() {
                tracing::debug!(domain, "removed allowlisted domain");
                removed += 1;
            }
        }
        removed
    }
}

impl Index<&str> for Blocklist {
    type Output = DomainBlock;

    fn index(&self, domain: &str) -> &DomainBlock {
        self.get(domain)
            .unwrap_or_else(|| panic!("domain {domain} not in blocklist"))
    }
}

impl<'a> IntoIterator for &'a Blocklist {
    type Item = &'a DomainBlock;
    type IntoIter = std::slice::Iter<'a, DomainBlock>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

/// Folds the sources, in order, into one blocklist.
pub fn merge_blocklists<S>(sources: impl IntoIterator<Item = S>, plan: MergePlan) -> Result<Blocklist>
where
    S: IntoIterator<Item = DomainBlock>,
{
    let mut merged = Blocklist::new();
    for (i, source) in sources.into_iter().enumerate() {
        let before = merged.len();
        for block in source {
            merged.insert(block, plan)?;
        }
        tracing::debug!(
            source = i,
            new_domains = merged.len() - before,
            total = merged.len(),
            "folded source"
        );
    }

    Ok(merged)
}
