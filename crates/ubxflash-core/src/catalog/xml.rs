//! Catalog document parsing
//!
//! Reads the flash database XML:
//!
//! ```xml
//! <flash fisVersion="2" revision="$Rev: 1234 $">
//!   <category cmd="winbond" supply="3.3V">
//!     <sectorSize>0x1000</sectorSize>
//!     <cap writeSuspend="1" fastProgram="0" deepSleep="1" speed="0"/>
//!     <device jedec="xEF4015">
//!       <sectorCount>512</sectorCount>
//!     </device>
//!   </category>
//!   <cmdset name="winbond">
//!     <length>72</length>      <!-- 72 up to 4032 bytes -->
//!     <checksum>78563412</checksum>
//!     <code>02080000...</code>
//!   </cmdset>
//! </flash>
//! ```
//!
//! Settings and the `cmd`/`supply` attributes of a `<category>` apply to
//! every `<device>` inside it; the device overrides them.

use roxmltree::{Document, Node};

use super::{Capabilities, CommandSet, DeviceSettings, FisRevision, FlashDescriptor, JedecId, Supply};
use crate::checksum::{verify_record, FIS_CHECKSUM_SEED};
use crate::error::{Error, Result};
use crate::fis::{FIS_MAX_LEN, FIS_RECORD_LEN};

/// Catalog format major revision understood by this build
pub const SUPPORTED_FIS_VERSION: u8 = 2;

/// Database revision used when the `revision` attribute cannot be parsed
pub const UNKNOWN_REVISION: u32 = 0xFFFF_FFFF;

/// Parsed document, not yet cross-checked
#[derive(Debug)]
pub(super) struct CatalogDoc {
    pub fis_version: FisRevision,
    pub revision: Option<u32>,
    pub devices: Vec<FlashDescriptor>,
    pub command_sets: Vec<CommandSet>,
}

/// `<cap>` attributes
#[derive(Debug, Clone, Copy, Default)]
struct CapDef {
    write_suspend: Option<bool>,
    fast_program: Option<bool>,
    deep_sleep: Option<bool>,
    speed: Option<bool>,
}

/// Settings of a `<category>` or `<device>` element
#[derive(Debug, Clone, Default)]
struct SettingsDef {
    cmd: Option<String>,
    sector_size: Option<u32>,
    sector_count: Option<u32>,
    cap: CapDef,
    settings: DeviceSettings,
}

impl SettingsDef {
    fn from_node(node: Node<'_, '_>) -> Result<Self> {
        let mut def = SettingsDef {
            cmd: node.attribute("cmd").map(str::to_string),
            ..Default::default()
        };
        def.settings.supply = node.attribute("supply").map(Supply::parse);

        for child in node.children().filter(Node::is_element) {
            let name = child.tag_name().name();
            match name {
                "sectorSize" => def.sector_size = Some(element_number(child)?),
                "sectorCount" => def.sector_count = Some(element_number(child)?),
                "hsp" => def.settings.hsp = Some(element_number(child)?),
                "cfg" => def.settings.cfg = Some(element_number(child)?),
                "minEraseSuspend" => def.settings.min_erase_suspend = Some(element_number(child)?),
                "numBytesWrite" => def.settings.num_bytes_write = Some(element_number(child)?),
                "deepSleepOpcode" => def.settings.deep_sleep_opcode = Some(element_byte(child)?),
                "deepSleepWakeupOpcode" => def.settings.wakeup_opcode = Some(element_byte(child)?),
                "deepSleepWakeupTimeout" => {
                    def.settings.wakeup_timeout = Some(element_byte(child)?)
                }
                "maxSpeed" => def.settings.max_speed = Some(element_byte(child)?),
                "cap" => {
                    def.cap = CapDef {
                        write_suspend: cap_flag(child, "writeSuspend")?,
                        fast_program: cap_flag(child, "fastProgram")?,
                        deep_sleep: cap_flag(child, "deepSleep")?,
                        speed: cap_flag(child, "speed")?,
                    }
                }
                // Devices of a category are handled by the caller
                "device" => {}
                other => log::debug!("catalog: ignoring <{}> in <{}>", other, node.tag_name().name()),
            }
        }

        Ok(def)
    }

    /// Fill every unset field from `parent`
    fn inherit(mut self, parent: &SettingsDef) -> Self {
        self.cmd = self.cmd.or_else(|| parent.cmd.clone());
        self.sector_size = self.sector_size.or(parent.sector_size);
        self.sector_count = self.sector_count.or(parent.sector_count);

        self.cap.write_suspend = self.cap.write_suspend.or(parent.cap.write_suspend);
        self.cap.fast_program = self.cap.fast_program.or(parent.cap.fast_program);
        self.cap.deep_sleep = self.cap.deep_sleep.or(parent.cap.deep_sleep);
        self.cap.speed = self.cap.speed.or(parent.cap.speed);

        let s = &mut self.settings;
        let p = &parent.settings;
        s.supply = s.supply.or(p.supply);
        s.hsp = s.hsp.or(p.hsp);
        s.cfg = s.cfg.or(p.cfg);
        s.min_erase_suspend = s.min_erase_suspend.or(p.min_erase_suspend);
        s.num_bytes_write = s.num_bytes_write.or(p.num_bytes_write);
        s.deep_sleep_opcode = s.deep_sleep_opcode.or(p.deep_sleep_opcode);
        s.wakeup_opcode = s.wakeup_opcode.or(p.wakeup_opcode);
        s.wakeup_timeout = s.wakeup_timeout.or(p.wakeup_timeout);
        s.max_speed = s.max_speed.or(p.max_speed);
        self
    }

    fn into_descriptor(self, jedec: JedecId, revision: FisRevision) -> Result<FlashDescriptor> {
        let sector_size = self
            .sector_size
            .ok_or_else(|| Error::xml(format!("device {}: missing <sectorSize>", jedec)))?;
        let sector_count = self
            .sector_count
            .ok_or_else(|| Error::xml(format!("device {}: missing <sectorCount>", jedec)))?;

        if !sector_size.is_power_of_two() {
            return Err(Error::xml(format!(
                "device {}: sector size {} is not a nonzero power of two",
                jedec, sector_size
            )));
        }
        if !sector_count.is_power_of_two() {
            return Err(Error::xml(format!(
                "device {}: sector count {} is not a nonzero power of two",
                jedec, sector_count
            )));
        }

        let flags = [
            (self.cap.write_suspend, Capabilities::WRITE_SUSPEND, "writeSuspend"),
            (self.cap.fast_program, Capabilities::FAST_PROGRAM, "fastProgram"),
            (self.cap.deep_sleep, Capabilities::DEEP_SLEEP, "deepSleep"),
            (self.cap.speed, Capabilities::MAX_SPEED, "speed"),
        ];
        let mut capabilities = Capabilities::empty();
        for (value, flag, attr) in flags {
            match value {
                Some(true) => capabilities |= flag,
                Some(false) => {}
                None => {
                    return Err(Error::xml(format!(
                        "device {}: missing capability attribute '{}'",
                        jedec, attr
                    )))
                }
            }
        }

        let command_set = self
            .cmd
            .ok_or_else(|| Error::xml(format!("device {}: no 'cmd' attribute", jedec)))?;

        Ok(FlashDescriptor {
            jedec,
            sector_size,
            sector_count,
            capabilities,
            revision,
            command_set,
            settings: self.settings,
        })
    }
}

/// Parse a catalog document
pub(super) fn parse(content: &str) -> Result<CatalogDoc> {
    let doc = Document::parse(content).map_err(|e| Error::xml(e.to_string()))?;
    let root = doc.root_element();

    if root.tag_name().name() != "flash" {
        return Err(Error::xml(format!(
            "root element is <{}>, expected <flash>",
            root.tag_name().name()
        )));
    }

    let fis_version = root
        .attribute("fisVersion")
        .ok_or_else(|| Error::xml("<flash> has no fisVersion"))
        .and_then(parse_fis_version)?;
    let revision = root.attribute("revision").map(parse_revision);

    let mut devices = Vec::new();
    let mut command_sets = Vec::new();

    for child in root.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "category" => {
                let category = SettingsDef::from_node(child)?;
                for device in child
                    .children()
                    .filter(|n| n.is_element() && n.tag_name().name() == "device")
                {
                    let jedec = device_jedec(device)?;
                    let def = SettingsDef::from_node(device)?.inherit(&category);
                    devices.push(def.into_descriptor(jedec, fis_version)?);
                }
            }
            "device" => {
                let jedec = device_jedec(child)?;
                let def = SettingsDef::from_node(child)?;
                devices.push(def.into_descriptor(jedec, fis_version)?);
            }
            "cmdset" => command_sets.push(parse_command_set(child)?),
            other => log::debug!("catalog: ignoring <{}>", other),
        }
    }

    Ok(CatalogDoc {
        fis_version,
        revision,
        devices,
        command_sets,
    })
}

fn device_jedec(node: Node<'_, '_>) -> Result<JedecId> {
    node.attribute("jedec")
        .ok_or_else(|| Error::xml("<device> without jedec attribute"))?
        .parse()
}

fn parse_fis_version(s: &str) -> Result<FisRevision> {
    let s = s.trim();
    let (major, minor) = s.split_once('.').unwrap_or((s, "0"));
    let major: u8 = major
        .parse()
        .map_err(|_| Error::xml(format!("invalid fisVersion '{}'", s)))?;
    let minor: u8 = minor
        .parse()
        .map_err(|_| Error::xml(format!("invalid fisVersion '{}'", s)))?;

    if major != SUPPORTED_FIS_VERSION {
        return Err(Error::VersionError(format!(
            "catalog fisVersion {} (supported: {})",
            s, SUPPORTED_FIS_VERSION
        )));
    }

    Ok(FisRevision { major, minor })
}

/// Parse a `$Rev: 1234 $` keyword string
fn parse_revision(s: &str) -> u32 {
    s.trim()
        .strip_prefix("$Rev:")
        .and_then(|rest| rest.trim().trim_end_matches('$').trim().parse().ok())
        .unwrap_or(UNKNOWN_REVISION)
}

fn parse_command_set(node: Node<'_, '_>) -> Result<CommandSet> {
    let name = node
        .attribute("name")
        .ok_or_else(|| Error::xml("<cmdset> without name"))?
        .to_string();

    let child = |tag: &str| {
        node.children()
            .find(|n| n.is_element() && n.tag_name().name() == tag)
    };

    let length = child("length")
        .ok_or_else(|| Error::xml(format!("cmdset '{}': missing <length>", name)))
        .and_then(element_number)? as usize;
    let code = child("code")
        .ok_or_else(|| Error::xml(format!("cmdset '{}': missing <code>", name)))
        .and_then(element_hex)?;
    let checksum = child("checksum")
        .ok_or_else(|| Error::xml(format!("cmdset '{}': missing <checksum>", name)))
        .and_then(element_hex)?;

    if !(FIS_RECORD_LEN..=FIS_MAX_LEN).contains(&length) {
        return Err(Error::corrupted(format!(
            "command set '{}' declares {} bytes, records hold {} to {}",
            name, length, FIS_RECORD_LEN, FIS_MAX_LEN
        )));
    }
    if code.len() > length {
        return Err(Error::xml(format!(
            "cmdset '{}': {} bytes of code exceed length {}",
            name,
            code.len(),
            length
        )));
    }
    if checksum.len() != 4 {
        return Err(Error::xml(format!(
            "cmdset '{}': checksum must be 4 bytes",
            name
        )));
    }

    let mut data = vec![0xFF; length];
    data[..code.len()].copy_from_slice(&code);
    data[length - 4..].copy_from_slice(&checksum);

    if !verify_record(FIS_CHECKSUM_SEED, &data) {
        return Err(Error::corrupted(format!(
            "command set '{}' fails its checksum",
            name
        )));
    }

    Ok(CommandSet { name, code: data })
}

fn element_text<'a>(node: Node<'a, '_>) -> &'a str {
    node.text().unwrap_or("").trim()
}

fn element_number(node: Node<'_, '_>) -> Result<u32> {
    let text = element_text(node);
    parse_number(text).ok_or_else(|| {
        Error::xml(format!(
            "<{}>: invalid number '{}'",
            node.tag_name().name(),
            text
        ))
    })
}

fn element_byte(node: Node<'_, '_>) -> Result<u8> {
    let value = element_number(node)?;
    u8::try_from(value).map_err(|_| {
        Error::xml(format!(
            "<{}>: value {} does not fit a byte",
            node.tag_name().name(),
            value
        ))
    })
}

fn element_hex(node: Node<'_, '_>) -> Result<Vec<u8>> {
    decode_hex(element_text(node))
        .ok_or_else(|| Error::xml(format!("<{}>: invalid hex string", node.tag_name().name())))
}

fn cap_flag(node: Node<'_, '_>, attr: &str) -> Result<Option<bool>> {
    match node.attribute(attr).map(str::trim) {
        None => Ok(None),
        Some("1") => Ok(Some(true)),
        Some("0") => Ok(Some(false)),
        Some(other) => Err(Error::xml(format!(
            "<cap {}=\"{}\">: expected 0 or 1",
            attr, other
        ))),
    }
}

/// Parse a number that can be hex (`0x...` or `x...`) or decimal
pub(crate) fn parse_number(s: &str) -> Option<u32> {
    let s = s.trim();
    if let Some(hex) = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .or_else(|| s.strip_prefix('x'))
    {
        u32::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

/// Decode a hex string, ignoring embedded whitespace
fn decode_hex(s: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = s.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks_exact(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            Some((hi << 4 | lo) as u8)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("0x1000"), Some(4096));
        assert_eq!(parse_number("x1000"), Some(4096));
        assert_eq!(parse_number("4096"), Some(4096));
        assert_eq!(parse_number(" 16 "), Some(16));
        assert_eq!(parse_number("0xZZ"), None);
        assert_eq!(parse_number("-1"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex("0a FF\n10"), Some(vec![0x0A, 0xFF, 0x10]));
        assert_eq!(decode_hex("abc"), None);
        assert_eq!(decode_hex("zz"), None);
        assert_eq!(decode_hex(""), Some(vec![]));
    }

    #[test]
    fn test_parse_revision() {
        assert_eq!(parse_revision("$Rev: 1234 $"), 1234);
        assert_eq!(parse_revision("$Rev$"), UNKNOWN_REVISION);
        assert_eq!(parse_revision("1234"), UNKNOWN_REVISION);
    }

    #[test]
    fn test_parse_fis_version() {
        assert_eq!(
            parse_fis_version("2").unwrap(),
            FisRevision { major: 2, minor: 0 }
        );
        assert_eq!(
            parse_fis_version("2.1").unwrap(),
            FisRevision { major: 2, minor: 1 }
        );
        assert!(matches!(
            parse_fis_version("3"),
            Err(Error::VersionError(_))
        ));
        assert!(matches!(
            parse_fis_version("two"),
            Err(Error::IncorrectXml(_))
        ));
    }
}
