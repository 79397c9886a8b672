//! Binary snapshots of a conversion
//!
//! A snapshot stores both layers and the configuration they were built
//! with, so a later run can inspect or re-check a network without
//! reconverting it. The blob is not validated on load beyond
//! deserialization: only load snapshots written by this tool.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::pipeline::Conversion;

impl Conversion {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        bincode::serialize_into(writer, self)?;
        info!(path = %path.display(), "snapshot saved");
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let conversion: Self = bincode::deserialize_from(reader)?;
        info!(path = %path.display(), "snapshot loaded");
        Ok(conversion)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
