//! Flash device catalog
//!
//! The catalog maps JEDEC IDs to [`FlashDescriptor`]s and holds the command
//! set templates from which FIS records are built. It is loaded once and
//! then shared read-only; all lookups take `&self`.

mod capabilities;
mod descriptor;
mod jedec;
mod xml;

pub use capabilities::Capabilities;
pub use descriptor::{CommandSet, DeviceSettings, FisRevision, FlashDescriptor, Supply};
pub use jedec::JedecId;
pub use xml::{SUPPORTED_FIS_VERSION, UNKNOWN_REVISION};

pub(crate) use xml::parse_number;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// In-memory flash device catalog
#[derive(Debug, Clone)]
pub struct Catalog {
    devices: BTreeMap<JedecId, FlashDescriptor>,
    command_sets: BTreeMap<String, CommandSet>,
    fis_version: FisRevision,
    revision: Option<u32>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self {
            devices: BTreeMap::new(),
            command_sets: BTreeMap::new(),
            fis_version: FisRevision::default(),
            revision: None,
        }
    }

    /// Parse a catalog from an XML string
    pub fn from_xml(content: &str) -> Result<Self> {
        let mut catalog = Self::new();
        catalog.load_str(content)?;
        Ok(catalog)
    }

    /// Read and parse a catalog file
    pub fn open(path: &Path) -> Result<Self> {
        let mut catalog = Self::new();
        catalog.load_file(path)?;
        Ok(catalog)
    }

    /// Load a catalog file, replacing the current contents
    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        self.clear();
        let content = fs::read_to_string(path).map_err(|e| Error::file(path, e))?;
        self.load_str(&content)
    }

    /// Load a catalog from XML, replacing the current contents
    ///
    /// Returns the number of devices. On error the catalog is left empty.
    pub fn load_str(&mut self, content: &str) -> Result<usize> {
        self.clear();

        let doc = xml::parse(content)?;

        let mut command_sets = BTreeMap::new();
        for set in doc.command_sets {
            if command_sets.contains_key(&set.name) {
                return Err(Error::xml(format!("duplicate cmdset '{}'", set.name)));
            }
            command_sets.insert(set.name.clone(), set);
        }

        let mut devices = BTreeMap::new();
        for device in doc.devices {
            if !command_sets.contains_key(&device.command_set) {
                return Err(Error::xml(format!(
                    "device {}: unknown cmdset '{}'",
                    device.jedec, device.command_set
                )));
            }
            if devices.contains_key(&device.jedec) {
                return Err(Error::xml(format!("duplicate device {}", device.jedec)));
            }
            devices.insert(device.jedec, device);
        }

        log::info!(
            "catalog: loaded {} devices, {} command sets (fisVersion {}, revision {:?})",
            devices.len(),
            command_sets.len(),
            doc.fis_version,
            doc.revision
        );

        self.devices = devices;
        self.command_sets = command_sets;
        self.fis_version = doc.fis_version;
        self.revision = doc.revision;
        Ok(self.devices.len())
    }

    fn clear(&mut self) {
        *self = Self::new();
    }

    /// Find the descriptor of a JEDEC ID
    pub fn lookup(&self, jedec: JedecId) -> Option<&FlashDescriptor> {
        self.devices.get(&jedec)
    }

    /// Find a command set by name
    pub fn command_set(&self, name: &str) -> Option<&CommandSet> {
        self.command_sets.get(name)
    }

    /// Database revision stamped into FIS records
    ///
    /// `None` when the document has no `revision` attribute; merged records
    /// then keep the revision of their command set template.
    pub fn revision(&self) -> Option<u32> {
        self.revision
    }

    /// Catalog format revision
    pub fn fis_version(&self) -> FisRevision {
        self.fis_version
    }

    /// Number of devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Check if the catalog has no devices
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Iterate over all devices in JEDEC order
    pub fn iter(&self) -> impl Iterator<Item = &FlashDescriptor> {
        self.devices.values()
    }
}
