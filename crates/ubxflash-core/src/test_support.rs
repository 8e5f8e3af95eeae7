//! Shared fixtures for unit tests

use crate::checksum::{stamp_record, FIS_CHECKSUM_SEED};
use crate::fis::FIS_RECORD_LEN;

/// Name of the command set every fixture device uses
pub const CMDSET_NAME: &str = "generic";

/// A 72-byte record template with a valid checksum
///
/// Byte 0 is 0x02 and the capability byte carries only the revision flag.
pub fn template_code() -> Vec<u8> {
    let mut code: Vec<u8> = (0..FIS_RECORD_LEN).map(|i| (i as u8).wrapping_mul(3)).collect();
    code[0] = 0x02;
    code[1] = 0x08;
    stamp_record(FIS_CHECKSUM_SEED, &mut code);
    code
}

/// A record template of `len` bytes sharing the field block of
/// [`template_code`]
pub fn long_template_code(len: usize) -> Vec<u8> {
    let mut code = template_code();
    code.truncate(FIS_RECORD_LEN - 4);
    code.extend((FIS_RECORD_LEN - 4..len).map(|i| (i as u8) ^ 0xA5));
    stamp_record(FIS_CHECKSUM_SEED, &mut code);
    code
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// `<cmdset>` element for [`template_code`]
pub fn cmdset_xml() -> String {
    cmdset_xml_of(CMDSET_NAME, &template_code())
}

/// `<cmdset>` element named `name` holding the stamped record `code`
pub fn cmdset_xml_of(name: &str, code: &[u8]) -> String {
    let (body, checksum) = code.split_at(code.len() - 4);
    format!(
        "<cmdset name=\"{}\">\n  <length>{}</length>\n  <checksum>{}</checksum>\n  <code>{}</code>\n</cmdset>",
        name,
        code.len(),
        hex(checksum),
        hex(body)
    )
}

/// Stand-alone `<device>` with every required field
pub fn device_xml(jedec: &str, sector_size: u32, sector_count: u32) -> String {
    format!(
        r#"<device jedec="{}" cmd="{}" supply="3.3V">
  <sectorSize>{}</sectorSize>
  <sectorCount>{}</sectorCount>
  <deepSleepOpcode>0xB9</deepSleepOpcode>
  <maxSpeed>104</maxSpeed>
  <cap writeSuspend="1" fastProgram="1" deepSleep="0" speed="1"/>
</device>"#,
        jedec, CMDSET_NAME, sector_size, sector_count
    )
}

/// Full catalog document around `body`, with the fixture command set
pub fn catalog_xml(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>\n<flash fisVersion=\"2\" revision=\"$Rev: 4242 $\">\n{}\n{}\n</flash>\n",
        body,
        cmdset_xml()
    )
}

/// Raw firmware image of `len` bytes without header magic
pub fn raw_image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
