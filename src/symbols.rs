// Author: Lukas Bower

//! Symbol addresses extracted from the kernel ELF image.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;
use xmas_elf::sections::SectionData;
use xmas_elf::symbol_table::Entry;
use xmas_elf::ElfFile;

/// Failure loading a symbol table from disk.
#[derive(Debug, Error)]
pub enum SymbolError {
    /// Image could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying filesystem error.
        source: io::Error,
    },
    /// Image is not a parseable ELF file.
    #[error("ELF parse error: {0}")]
    Parse(&'static str),
    /// Image parsed but carries no symbol table section.
    #[error("no symbol table in image")]
    NoSymbolTable,
}

/// Name-to-address map over the kernel's `.symtab`.
///
/// Local symbols are kept: the allocator head and the PMM counters are
/// `static` in the kernel sources, so they only appear with local binding.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    entries: HashMap<String, u64>,
}

impl SymbolTable {
    /// Load the symbol table from an ELF image on disk.
    pub fn load(path: &Path) -> Result<Self, SymbolError> {
        let data = std::fs::read(path).map_err(|source| SymbolError::Read {
            path: path.to_owned(),
            source,
        })?;
        let table = Self::from_elf_bytes(&data)?;
        debug!("loaded {} symbols from {}", table.len(), path.display());
        Ok(table)
    }

    /// Parse a symbol table out of in-memory ELF bytes.
    pub fn from_elf_bytes(data: &[u8]) -> Result<Self, SymbolError> {
        let elf = ElfFile::new(data).map_err(SymbolError::Parse)?;
        let mut entries = HashMap::new();
        for section in elf.section_iter() {
            match section.get_data(&elf) {
                Ok(SectionData::SymbolTable32(symbols)) => {
                    for symbol in symbols {
                        if let Ok(name) = symbol.get_name(&elf) {
                            if !name.is_empty() {
                                entries.insert(name.to_owned(), symbol.value());
                            }
                        }
                    }
                }
                Ok(SectionData::SymbolTable64(symbols)) => {
                    for symbol in symbols {
                        if let Ok(name) = symbol.get_name(&elf) {
                            if !name.is_empty() {
                                entries.insert(name.to_owned(), symbol.value());
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        if entries.is_empty() {
            return Err(SymbolError::NoSymbolTable);
        }
        Ok(Self { entries })
    }

    /// Build a table from explicit name/address pairs.
    pub fn from_entries(pairs: impl IntoIterator<Item = (String, u64)>) -> Self {
        Self {
            entries: pairs.into_iter().collect(),
        }
    }

    /// Address of `name`, if present.
    pub fn address(&self, name: &str) -> Option<u64> {
        self.entries.get(name).copied()
    }

    /// Number of symbols in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no symbols are loaded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
