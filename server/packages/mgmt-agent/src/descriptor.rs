//! Identity of a deployable unit image.
//!
//! An image is a ZIP archive carrying `META-INF/MANIFEST.MF` with
//! `Unit-SymbolicName` and optional `Unit-Version` headers.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Cursor, Read};

use thiserror::Error;

pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
pub const SYMBOLIC_NAME_HEADER: &str = "Unit-SymbolicName";
pub const VERSION_HEADER: &str = "Unit-Version";

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("unit image is not a readable archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("no manifest in unit image")]
    MissingManifest,
    #[error("no proper {SYMBOLIC_NAME_HEADER} in unit image: {0}")]
    SymbolicName(String),
    #[error("invalid version '{0}'")]
    Version(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub micro: u64,
    pub qualifier: String,
}

impl Version {
    pub fn parse(raw: &str) -> Result<Self, DescriptorError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let invalid = || DescriptorError::Version(raw.to_string());
        let mut parts = trimmed.splitn(4, '.');
        let mut numeric = [0u64; 3];
        for slot in numeric.iter_mut() {
            match parts.next() {
                Some(part) => *slot = part.parse::<u64>().map_err(|_| invalid())?,
                None => break,
            }
        }
        let qualifier = match parts.next() {
            Some(qualifier)
                if !qualifier.is_empty()
                    && qualifier
                        .chars()
                        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-') =>
            {
                qualifier.to_string()
            }
            Some(_) => return Err(invalid()),
            None => String::new(),
        };
        Ok(Self {
            major: numeric[0],
            minor: numeric[1],
            micro: numeric[2],
            qualifier,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitIdentity {
    pub symbolic_name: String,
    pub version: Version,
}

impl UnitIdentity {
    /// Location used when a unit is installed without an explicit one.
    pub fn placeholder_location(&self) -> String {
        format!("manual:{}", self.symbolic_name)
    }
}

/// Reads the identity out of a unit image.
pub fn identify(image: &[u8]) -> Result<UnitIdentity, DescriptorError> {
    let headers = read_manifest(image)?;
    let raw_name = headers
        .get(SYMBOLIC_NAME_HEADER)
        .ok_or_else(|| DescriptorError::SymbolicName(String::new()))?;
    let symbolic_name = parse_symbolic_name(raw_name)
        .ok_or_else(|| DescriptorError::SymbolicName(raw_name.clone()))?;
    let version = match headers.get(VERSION_HEADER) {
        Some(raw) => Version::parse(raw)?,
        None => Version::default(),
    };
    Ok(UnitIdentity {
        symbolic_name,
        version,
    })
}

/// Token before the first `;` or whitespace, after optional leading whitespace.
pub fn parse_symbolic_name(raw: &str) -> Option<String> {
    let token: String = raw
        .trim_start()
        .chars()
        .take_while(|ch| *ch != ';' && !ch.is_whitespace())
        .collect();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

pub fn read_manifest(image: &[u8]) -> Result<BTreeMap<String, String>, DescriptorError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(image))?;
    let mut entry = match archive.by_name(MANIFEST_PATH) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Err(DescriptorError::MissingManifest),
        Err(err) => return Err(err.into()),
    };
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    Ok(parse_manifest(&text))
}

fn parse_manifest(text: &str) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    let mut current: Option<(String, String)> = None;
    for line in text.lines() {
        if let Some(continuation) = line.strip_prefix(' ') {
            if let Some((_, value)) = current.as_mut() {
                value.push_str(continuation);
            }
            continue;
        }
        if let Some((name, value)) = current.take() {
            headers.insert(name, value);
        }
        if line.is_empty() {
            // Only the main section is relevant.
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            current = Some((name.trim().to_string(), value.trim_start().to_string()));
        }
    }
    if let Some((name, value)) = current {
        headers.insert(name, value);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn image(manifest: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(MANIFEST_PATH, zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(manifest.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn symbolic_name_stops_at_directives() {
        assert_eq!(
            parse_symbolic_name("  com.acme.core;singleton:=true"),
            Some("com.acme.core".to_string())
        );
        assert_eq!(parse_symbolic_name(" ;x"), None);
    }

    #[test]
    fn identity_defaults_version_to_zero() {
        let identity = identify(&image("Unit-SymbolicName: com.acme.api\n")).unwrap();
        assert_eq!(identity.symbolic_name, "com.acme.api");
        assert_eq!(identity.version.to_string(), "0.0.0");
        assert_eq!(identity.placeholder_location(), "manual:com.acme.api");
    }

    #[test]
    fn continuation_lines_are_joined() {
        let identity = identify(&image(
            "Manifest-Version: 1.0\nUnit-SymbolicName: com.acme.\n very.long.name\nUnit-Version: 1.2.3.RC1\n",
        ))
        .unwrap();
        assert_eq!(identity.symbolic_name, "com.acme.very.long.name");
        assert_eq!(identity.version.to_string(), "1.2.3.RC1");
    }

    #[test]
    fn malformed_images_are_rejected() {
        assert!(matches!(
            identify(b"not a zip"),
            Err(DescriptorError::Archive(_))
        ));
        assert!(matches!(
            identify(&image("Unit-Version: 1.0\n")),
            Err(DescriptorError::SymbolicName(_))
        ));
        assert!(matches!(
            identify(&image("Unit-SymbolicName: a\nUnit-Version: one\n")),
            Err(DescriptorError::Version(_))
        ));
    }
}
