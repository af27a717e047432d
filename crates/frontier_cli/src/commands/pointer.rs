//! Pointer encode and decode commands.

use frontier_lfs_protocol::Pointer;
use std::fs::{self, File};
use std::path::Path;

/// Prints the pointer for a file's content.
pub fn encode(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let pointer = Pointer::from_reader(File::open(file)?)?;
    print!("{}", pointer.encode());
    Ok(())
}

/// Parses a pointer file and prints its fields.
pub fn decode(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let pointer = Pointer::decode(&fs::read(file)?)?;
    println!("version {}", pointer.spec_version());
    println!("oid     sha256:{}", pointer.oid());
    println!("size    {}", pointer.size());
    Ok(())
}
