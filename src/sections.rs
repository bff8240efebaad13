//! Page sections and their static boilerplate.
//!
//! Every page carries four content sections. Each one pairs a hand-authored
//! paragraph shared by all pages with the row's own text for that section:
//!
//! | Section | Dataset column | Context keys |
//! |---------|----------------|--------------|
//! | residential | `ResidentialContent` | `residential_static_content`, `residential_dynamic_content` |
//! | commercial | `CommercialContent` | `commercial_static_content`, `commercial_dynamic_content` |
//! | industrial | `IndustrialContent` | `industrial_static_content`, `industrial_dynamic_content` |
//! | agricultural | `AgriculturalContent` | `agricultural_static_content`, `agricultural_dynamic_content` |
//!
//! The boilerplate table is built once per run and read-only afterwards.
//! Stock texts are compiled in; a directory of `<section>.txt` files can
//! override any of them.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SectionError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("boilerplate for section '{0}' is empty")]
    Empty(Section),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Residential,
    Commercial,
    Industrial,
    Agricultural,
}

impl Section {
    /// All sections, in page order.
    pub const ALL: [Section; 4] = [
        Section::Residential,
        Section::Commercial,
        Section::Industrial,
        Section::Agricultural,
    ];

    /// Lowercase key used in template context names and override filenames.
    pub fn key(self) -> &'static str {
        match self {
            Section::Residential => "residential",
            Section::Commercial => "commercial",
            Section::Industrial => "industrial",
            Section::Agricultural => "agricultural",
        }
    }

    /// Heading shown on the page.
    pub fn display_name(self) -> &'static str {
        match self {
            Section::Residential => "Residential",
            Section::Commercial => "Commercial",
            Section::Industrial => "Industrial",
            Section::Agricultural => "Agricultural",
        }
    }

    fn stock_text(self) -> &'static str {
        match self {
            Section::Residential => {
                "Our residential steel buildings offer durability and versatility \
for homeowners seeking reliable storage solutions, workshops, or garages. \
Built to withstand local weather conditions and engineered for maximum efficiency, \
our structures provide the perfect blend of functionality and value."
            }
            Section::Commercial => {
                "Businesses trust our commercial steel buildings for their \
exceptional strength and adaptability. From retail spaces to warehouses, \
our customizable designs meet diverse business needs while ensuring \
compliance with local building codes and regulations."
            }
            Section::Industrial => {
                "Industrial operations benefit from our robust steel building \
solutions. Engineered for heavy-duty applications, our structures provide \
the space and durability needed for manufacturing, storage, and processing \
facilities while maintaining cost-effectiveness."
            }
            Section::Agricultural => {
                "Farmers and ranchers rely on our agricultural steel buildings \
for protecting livestock, storing equipment, and securing harvests. \
Our designs incorporate features specifically tailored to agricultural \
needs, ensuring long-lasting performance in rural environments."
            }
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Static boilerplate for every section.
#[derive(Debug, Clone)]
pub struct SectionTable {
    texts: [String; 4],
}

impl Default for SectionTable {
    fn default() -> Self {
        Self::stock()
    }
}

impl SectionTable {
    /// The compiled-in texts.
    pub fn stock() -> Self {
        Self {
            texts: Section::ALL.map(|s| s.stock_text().to_string()),
        }
    }

    /// Stock texts, with `<key>.txt` files from `dir` taking precedence.
    ///
    /// Sections without an override file keep their stock text. An override
    /// that is empty after trimming is rejected: every section must resolve
    /// to real content.
    pub fn load(dir: &Path) -> Result<Self, SectionError> {
        let mut table = Self::stock();
        for section in Section::ALL {
            let path = dir.join(format!("{}.txt", section.key()));
            if !path.exists() {
                continue;
            }
            let text = fs::read_to_string(&path).map_err(|source| SectionError::Io {
                path: path.clone(),
                source,
            })?;
            tracing::debug!(section = %section, path = %path.display(), "section override loaded");
            table.texts[section as usize] = text.trim().to_string();
        }
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), SectionError> {
        for section in Section::ALL {
            if self.text(section).trim().is_empty() {
                return Err(SectionError::Empty(section));
            }
        }
        Ok(())
    }

    pub fn text(&self, section: Section) -> &str {
        &self.texts[section as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn stock_table_covers_every_section() {
        let table = SectionTable::stock();
        for section in Section::ALL {
            assert!(!table.text(section).trim().is_empty(), "{section} is empty");
        }
        assert!(table.validate().is_ok());
    }

    #[test]
    fn stock_texts_are_distinct() {
        let table = SectionTable::stock();
        assert!(table.text(Section::Residential).contains("homeowners"));
        assert!(table.text(Section::Commercial).contains("Businesses"));
        assert!(table.text(Section::Industrial).contains("heavy-duty"));
        assert!(table.text(Section::Agricultural).contains("livestock"));
    }

    #[test]
    fn keys_and_names() {
        let keys: Vec<&str> = Section::ALL.iter().map(|s| s.key()).collect();
        assert_eq!(
            keys,
            vec!["residential", "commercial", "industrial", "agricultural"]
        );
        assert_eq!(Section::Industrial.display_name(), "Industrial");
        assert_eq!(Section::Agricultural.to_string(), "agricultural");
    }

    #[test]
    fn load_without_overrides_is_stock() {
        let tmp = TempDir::new().unwrap();
        let table = SectionTable::load(tmp.path()).unwrap();
        assert_eq!(
            table.text(Section::Commercial),
            SectionTable::stock().text(Section::Commercial)
        );
    }

    #[test]
    fn load_applies_override_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("industrial.txt"), "  Custom industrial copy.\n").unwrap();

        let table = SectionTable::load(tmp.path()).unwrap();
        assert_eq!(table.text(Section::Industrial), "Custom industrial copy.");
        assert_eq!(
            table.text(Section::Residential),
            SectionTable::stock().text(Section::Residential)
        );
    }

    #[test]
    fn load_rejects_blank_override() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("residential.txt"), "   \n").unwrap();

        let result = SectionTable::load(tmp.path());
        assert!(matches!(
            result,
            Err(SectionError::Empty(Section::Residential))
        ));
    }
}
