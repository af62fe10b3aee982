//! Role registry and paragraph classifications.
//!
//! The registry maps the closed set of document roles onto style ids of the
//! architect template. Classifications assign a role to a paragraph index
//! of the target body.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Structural role of a specification paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "SectionID")]
    SectionId,
    #[serde(rename = "SectionTitle")]
    SectionTitle,
    #[serde(rename = "PART")]
    Part,
    #[serde(rename = "ARTICLE")]
    Article,
    #[serde(rename = "PARAGRAPH")]
    Paragraph,
    #[serde(rename = "SUBPARAGRAPH")]
    Subparagraph,
    #[serde(rename = "SUBSUBPARAGRAPH")]
    Subsubparagraph,
}

impl Role {
    /// Every role, in document hierarchy order.
    pub const ALL: [Role; 7] = [
        Role::SectionId,
        Role::SectionTitle,
        Role::Part,
        Role::Article,
        Role::Paragraph,
        Role::Subparagraph,
        Role::Subsubparagraph,
    ];

    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SectionId => "SectionID",
            Role::SectionTitle => "SectionTitle",
            Role::Part => "PART",
            Role::Article => "ARTICLE",
            Role::Paragraph => "PARAGRAPH",
            Role::Subparagraph => "SUBPARAGRAPH",
            Role::Subsubparagraph => "SUBSUBPARAGRAPH",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == name)
            .ok_or_else(|| Error::UnknownRole(name.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct RawRegistry {
    #[serde(default)]
    version: Option<serde_json::Value>,
    #[serde(default)]
    source_docx: Option<String>,
    roles: Option<BTreeMap<String, RawRoleEntry>>,
}

#[derive(Debug, Deserialize)]
struct RawRoleEntry {
    #[serde(default)]
    style_id: Option<String>,
    #[serde(default, rename = "styleId")]
    style_id_camel: Option<String>,
}

/// Role to style id mapping.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoleRegistry {
    /// Registry format version, if stated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<serde_json::Value>,
    /// Template the registry was built from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_docx: Option<String>,
    /// Role mappings
    pub roles: BTreeMap<Role, String>,
}

impl RoleRegistry {
    /// Build a registry from explicit mappings.
    pub fn from_mappings(mappings: impl IntoIterator<Item = (Role, String)>) -> Result<Self> {
        let roles: BTreeMap<Role, String> = mappings
            .into_iter()
            .map(|(r, s)| (r, s.trim().to_string()))
            .filter(|(_, s)| !s.is_empty())
            .collect();
        if roles.is_empty() {
            return Err(Error::Registry(
                "registry contains no usable role to style mappings".to_string(),
            ));
        }
        Ok(Self {
            roles,
            ..Default::default()
        })
    }

    /// Parse registry JSON.
    ///
    /// Entries may spell the style id `style_id` or `styleId`; blank ids
    /// are ignored. Role names outside the known set are rejected.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawRegistry = serde_json::from_str(json)?;
        let entries = raw
            .roles
            .ok_or_else(|| Error::Registry("registry has no 'roles' object".to_string()))?;

        let mut roles = BTreeMap::new();
        for (name, entry) in entries {
            let role: Role = name.parse()?;
            let style_id = entry
                .style_id
                .or(entry.style_id_camel)
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            if style_id.is_empty() {
                log::debug!("Registry role {} has no style id; ignored", role);
                continue;
            }
            roles.insert(role, style_id);
        }

        if roles.is_empty() {
            return Err(Error::Registry(
                "registry contains no usable role to style mappings".to_string(),
            ));
        }

        Ok(Self {
            version: raw.version,
            source_docx: raw.source_docx,
            roles,
        })
    }

    /// Load registry JSON from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::MissingComponent(path.display().to_string()));
        }
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Style id mapped to a role name, if the role is known and mapped.
    pub fn style_for(&self, role: &str) -> Option<&str> {
        let role: Role = role.parse().ok()?;
        self.roles.get(&role).map(String::as_str)
    }

    /// Mapped style ids, deduplicated, in role order.
    pub fn style_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.roles
            .values()
            .filter(|s| seen.insert(s.as_str()))
            .cloned()
            .collect()
    }
}

/// One classifier decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Index into the target body's paragraph sequence
    pub paragraph_index: usize,
    /// Role name as emitted by the classifier
    pub csi_role: String,
}

/// A batch of classifications.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationSet {
    pub classifications: Vec<Classification>,
    #[serde(default)]
    pub notes: Vec<serde_json::Value>,
}

impl ClassificationSet {
    /// Parse classifications JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load classifications JSON from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::MissingComponent(path.display().to_string()));
        }
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Style ids needed by the roles this batch uses, in first-use order.
    pub fn required_styles(&self, registry: &RoleRegistry) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for item in &self.classifications {
            if let Some(style) = registry.style_for(&item.csi_role) {
                if seen.insert(style) {
                    out.push(style.to_string());
                }
            }
        }
        out
    }
}

/// Validate a batch before anything is mutated.
///
/// Records are checked in order; the first failing record decides the
/// error. Every index must exist, every role must be mapped, and no index
/// may be classified twice.
pub fn validate(
    registry: &RoleRegistry,
    classifications: &[Classification],
    paragraph_count: usize,
) -> Result<()> {
    let mut seen = HashSet::new();
    for item in classifications {
        if item.paragraph_index >= paragraph_count {
            return Err(Error::ParagraphOutOfRange {
                index: item.paragraph_index,
                count: paragraph_count,
            });
        }
        if registry.style_for(&item.csi_role).is_none() {
            return Err(Error::UnmappedRole {
                role: item.csi_role.clone(),
                index: item.paragraph_index,
            });
        }
        if !seen.insert(item.paragraph_index) {
            return Err(Error::DuplicateClassification(item.paragraph_index));
        }
    }
    Ok(())
}

/// Summary of a batch against a registry and a document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Preflight {
    /// Paragraphs in the target body
    pub paragraph_count: usize,
    /// Classification count per role name
    pub roles_in_classifications: BTreeMap<String, usize>,
    /// The registry in effect
    pub registry: BTreeMap<String, String>,
    /// Classified role names with no mapping
    pub unmapped_roles: Vec<String>,
    /// Classified indices past the end of the body
    pub out_of_range: Vec<usize>,
    /// Indices classified more than once
    pub duplicates: Vec<usize>,
}

impl Preflight {
    pub fn compute(
        registry: &RoleRegistry,
        classifications: &ClassificationSet,
        paragraph_count: usize,
    ) -> Self {
        let mut report = Preflight {
            paragraph_count,
            registry: registry
                .roles
                .iter()
                .map(|(r, s)| (r.to_string(), s.clone()))
                .collect(),
            ..Default::default()
        };

        let mut seen = HashSet::new();
        for item in &classifications.classifications {
            *report
                .roles_in_classifications
                .entry(item.csi_role.clone())
                .or_default() += 1;
            if item.paragraph_index >= paragraph_count {
                report.out_of_range.push(item.paragraph_index);
            }
            if !seen.insert(item.paragraph_index) && !report.duplicates.contains(&item.paragraph_index) {
                report.duplicates.push(item.paragraph_index);
            }
        }

        report.unmapped_roles = report
            .roles_in_classifications
            .keys()
            .filter(|r| registry.style_for(r).is_none())
            .cloned()
            .collect();

        report
    }

    /// Whether the batch can be applied as is.
    pub fn is_clean(&self) -> bool {
        self.unmapped_roles.is_empty() && self.out_of_range.is_empty() && self.duplicates.is_empty()
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
