use crate::Error;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// The persisted list of watched paths: one absolute path per line, blank
/// lines ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchList {
    entries: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
}

impl WatchList {
    /// Read the list from `path`. A missing file is an empty list.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn parse(text: &str) -> Self {
        let mut entries: Vec<PathBuf> = Vec::new();
        for line in text.lines() {
            let Some(entry) = Self::clean(line) else {
                continue;
            };
            let entry = PathBuf::from(entry);
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        }
        Self { entries }
    }

    /// Append `target` to the list stored at `path`, creating the file if
    /// needed. The target must exist and is stored in absolute form.
    pub fn add(path: impl AsRef<Path>, target: &str) -> Result<(PathBuf, AddOutcome), Error> {
        let path = path.as_ref();
        let target = Self::clean(target).ok_or(Error::EmptyTarget)?;
        let target = std::path::absolute(target)?;
        if !target.exists() {
            return Err(Error::TargetNotFound(target));
        }

        let list = Self::load(path)?;
        if list.contains(&target) {
            return Ok((target, AddOutcome::AlreadyPresent));
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        // The file may have been edited by hand without a trailing newline.
        let needs_separator = std::fs::read(path)
            .map(|bytes| bytes.last().is_some_and(|b| *b != b'\n'))
            .unwrap_or(false);

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if needs_separator {
            writeln!(file)?;
        }
        writeln!(file, "{}", target.display())?;
        Ok((target, AddOutcome::Added))
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.iter().any(|entry| entry == path)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn clean(line: &str) -> Option<&str> {
        let line = line.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        (!line.is_empty()).then_some(line)
    }
}

impl IntoIterator for WatchList {
    type Item = PathBuf;
    type IntoIter = std::vec::IntoIter<PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
