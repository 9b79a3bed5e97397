use bytes::Bytes;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use crate::error::{Error, Result};

/// Provider of authorized keys files.
pub trait KeySources {
    /// Reads the contents of the source named `source`.
    ///
    /// Returns `None` if the source does not exist.
    fn read(&self, source: &str) -> Result<Option<Bytes>>;
}

/// Authorized keys files in the filesystem of a user.
///
/// Source names are paths with the tokens `%h` (home directory), `%u` (user name) and `%%`
/// (literal `%`). Relative paths are relative to the home directory.
#[derive(Debug, Clone)]
pub struct FsKeySources {
    home: PathBuf,
    user: String,
}

impl FsKeySources {
    /// Creates a provider for the user `user` with home directory `home`.
    pub fn new(home: impl Into<PathBuf>, user: impl Into<String>) -> Self {
        Self { home: home.into(), user: user.into() }
    }

    /// Expands the tokens in `source` and resolves it relative to the home directory.
    pub fn expand(&self, source: &str) -> Result<PathBuf> {
        let mut expanded = String::new();
        let mut chars = source.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                expanded.push(c);
                continue
            }
            match chars.next() {
                Some('h') => {
                    let home = self.home.to_str()
                        .ok_or(Error::InvalidArgument("home directory is not valid utf-8"))?;
                    expanded.push_str(home);
                },
                Some('u') => expanded.push_str(&self.user),
                Some('%') => expanded.push('%'),
                _ => return Err(Error::InvalidArgument("unknown %-token in authorized keys file name")),
            }
        }

        let path = Path::new(&expanded);
        Ok(if path.is_absolute() { path.to_path_buf() } else { self.home.join(path) })
    }
}

impl KeySources for FsKeySources {
    fn read(&self, source: &str) -> Result<Option<Bytes>> {
        let path = self.expand(source)?;
        log::debug!("trying authorized keys file {}", path.display());
        match std::fs::read(&path) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::KeyFileIo(err)),
        }
    }
}

/// Sources kept in memory, keyed by name.
impl KeySources for HashMap<String, Bytes> {
    fn read(&self, source: &str) -> Result<Option<Bytes>> {
        Ok(self.get(source).cloned())
    }
}
