// Gestion des fichiers MIDI de démo

use crate::midi::MidiError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const DEFAULT_DEMO: &str = "zelda-idk.mid";

/// A directory of `.mid` / `.midi` files selectable by name
#[derive(Debug, Clone)]
pub struct DemoLibrary {
    dir: PathBuf,
}

impl DemoLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File names of every MIDI file in the library, sorted.
    ///
    /// A missing directory is an empty library.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && is_midi_file(entry.path()))
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();

        names.sort();
        names
    }

    /// Raw bytes of the demo called `name`
    pub fn load(&self, name: &str) -> Result<Vec<u8>, MidiError> {
        // Names only, no path traversal out of the library
        let file_name = Path::new(name)
            .file_name()
            .ok_or_else(|| MidiError::DemoNotFound(name.to_string()))?;
        let path = self.dir.join(file_name);

        if !path.is_file() || !is_midi_file(&path) {
            return Err(MidiError::DemoNotFound(name.to_string()));
        }

        Ok(std::fs::read(path)?)
    }
}

fn is_midi_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("mid") || ext.eq_ignore_ascii_case("midi"))
        .unwrap_or(false)
}
