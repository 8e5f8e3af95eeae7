//! Flash capability flags as stored in the FIS record

use bitflags::bitflags;

bitflags! {
    /// Capability byte of a FIS record
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u8 {
        /// Program/erase suspend command available
        const WRITE_SUSPEND = 0x01;
        /// Sub-page program command available
        const FAST_PROGRAM  = 0x02;
        /// Deep sleep command available
        const DEEP_SLEEP    = 0x04;
        /// The record carries a revision
        const REVISION      = 0x08;
        /// The record carries a maximum speed
        const MAX_SPEED     = 0x10;
    }
}

impl Capabilities {
    /// Flags a catalog `<cap>` element controls
    pub const CATALOG: Capabilities = Capabilities::WRITE_SUSPEND
        .union(Capabilities::FAST_PROGRAM)
        .union(Capabilities::DEEP_SLEEP)
        .union(Capabilities::MAX_SPEED);

    /// Replace the catalog-controlled flags of `self` with those of `other`
    ///
    /// Flags outside [`Capabilities::CATALOG`] are kept as they are.
    pub fn with_catalog_flags(self, other: Capabilities) -> Capabilities {
        (self - Self::CATALOG) | (other & Self::CATALOG)
    }

    /// Short human-readable list, e.g. `write-suspend,deep-sleep`
    pub fn describe(self) -> String {
        let names: Vec<&str> = [
            (Self::WRITE_SUSPEND, "write-suspend"),
            (Self::FAST_PROGRAM, "fast-program"),
            (Self::DEEP_SLEEP, "deep-sleep"),
            (Self::REVISION, "revision"),
            (Self::MAX_SPEED, "max-speed"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect();

        if names.is_empty() {
            "none".into()
        } else {
            names.join(",")
        }
    }
}
