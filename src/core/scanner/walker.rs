//! Directory walking implementation using walkdir.

use super::{filter::ImageFilter, ImageScanner, ImageSource, ScanResult};
use crate::error::ScanError;
use crate::events::{Event, EventSender, ScanEvent, ScanProgress};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Configuration for the directory scanner
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    /// Whether to follow symbolic links
    pub follow_symlinks: bool,
    /// Whether to include hidden files and directories
    pub include_hidden: bool,
    /// Maximum directory depth (None = unlimited)
    pub max_depth: Option<usize>,
    /// Custom extensions to include (None = use defaults)
    pub extensions: Option<Vec<String>>,
}

/// Scanner implementation using the walkdir crate
pub struct WalkDirScanner {
    config: ScanConfig,
    filter: ImageFilter,
}

impl WalkDirScanner {
    pub fn new(config: ScanConfig) -> Self {
        let mut filter = ImageFilter::new().with_hidden(config.include_hidden);

        if let Some(ref extensions) = config.extensions {
            filter = filter.with_extensions(extensions.clone());
        }

        Self { config, filter }
    }

    /// Collect image paths under one root
    fn scan_directory(
        &self,
        root: &Path,
        found_so_far: usize,
        events: &EventSender,
    ) -> Result<(Vec<PathBuf>, Vec<ScanError>), ScanError> {
        if !root.is_dir() {
            return Err(ScanError::DirectoryNotFound {
                path: root.to_path_buf(),
            });
        }

        let mut files = Vec::new();
        let mut errors = Vec::new();
        let mut directories_scanned = 0;

        let mut walker = WalkDir::new(root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name();

        if let Some(depth) = self.config.max_depth {
            walker = walker.max_depth(depth);
        }

        let include_hidden = self.config.include_hidden;
        let entries = walker
            .into_iter()
            .filter_entry(|e| include_hidden || e.depth() == 0 || !ImageFilter::is_hidden(e.path()));

        for entry_result in entries {
            match entry_result {
                Ok(entry) => {
                    let path = entry.path();

                    if entry.file_type().is_dir() {
                        directories_scanned += 1;
                        events.send(Event::Scan(ScanEvent::Progress(ScanProgress {
                            directories_scanned,
                            images_found: found_so_far + files.len(),
                            current_path: path.to_path_buf(),
                        })));
                        continue;
                    }

                    if self.filter.should_include(path) {
                        files.push(path.to_path_buf());
                    }
                }
                Err(e) => {
                    let path = e.path().map(|p| p.to_path_buf()).unwrap_or_default();

                    let error = if e.io_error().map(|e| e.kind())
                        == Some(std::io::ErrorKind::PermissionDenied)
                    {
                        ScanError::PermissionDenied { path: path.clone() }
                    } else {
                        ScanError::ReadDirectory {
                            path: path.clone(),
                            source: std::io::Error::other(e.to_string()),
                        }
                    };

                    tracing::warn!("{}", error);
                    events.send(Event::Scan(ScanEvent::Error {
                        path,
                        message: error.to_string(),
                    }));

                    errors.push(error);
                }
            }
        }

        Ok((files, errors))
    }
}

/// Turn sorted paths into sources, keeping the first file per identity
fn assign_identities(paths: Vec<PathBuf>, errors: &mut Vec<ScanError>) -> Vec<ImageSource> {
    let mut seen: HashMap<String, PathBuf> = HashMap::new();
    let mut images = Vec::with_capacity(paths.len());

    for path in paths {
        let Some(source) = ImageSource::from_path(&path) else {
            continue;
        };

        match seen.get(source.identity.as_str()) {
            Some(first) => errors.push(ScanError::DuplicateIdentity {
                identity: source.identity.to_string(),
                first: first.clone(),
                duplicate: path,
            }),
            None => {
                seen.insert(source.identity.to_string(), path);
                images.push(source);
            }
        }
    }

    images.sort_by(|a, b| a.identity.cmp(&b.identity));
    images
}

impl ImageScanner for WalkDirScanner {
    fn scan(&self, paths: &[PathBuf]) -> Result<ScanResult, ScanError> {
        self.scan_with_events(paths, &crate::events::null_sender())
    }

    fn scan_with_events(
        &self,
        paths: &[PathBuf],
        events: &EventSender,
    ) -> Result<ScanResult, ScanError> {
        events.send(Event::Scan(ScanEvent::Started {
            paths: paths.to_vec(),
        }));

        let mut all_files = Vec::new();
        let mut all_errors = Vec::new();

        for path in paths {
            match self.scan_directory(path, all_files.len(), events) {
                Ok((files, errors)) => {
                    all_files.extend(files);
                    all_errors.extend(errors);
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    all_errors.push(e);
                }
            }
        }

        all_files.sort();
        all_files.dedup();
        let images = assign_identities(all_files, &mut all_errors);

        for error in &all_errors {
            if let ScanError::DuplicateIdentity { .. } = error {
                tracing::warn!("{}", error);
            }
        }

        events.send(Event::Scan(ScanEvent::Completed {
            total_images: images.len(),
        }));

        Ok(ScanResult {
            images,
            errors: all_errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, relative: &str) -> PathBuf {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, b"not decoded by the scanner").unwrap();
        path
    }

    fn identities(result: &ScanResult) -> Vec<&str> {
        result.images.iter().map(|i| i.identity.as_str()).collect()
    }

    #[test]
    fn scan_empty_directory_returns_empty_vec() {
        let temp_dir = TempDir::new().unwrap();
        let scanner = WalkDirScanner::new(ScanConfig::default());

        let result = scanner.scan(&[temp_dir.path().to_path_buf()]).unwrap();

        assert!(result.images.is_empty());
        assert!(result.errors.is_empty());
    }

    #[test]
    fn finds_images_recursively_sorted_by_identity() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "zebra.webp");
        touch(temp_dir.path(), "nested/deeper/aardvark.png");
        touch(temp_dir.path(), "nested/notes.txt");

        let scanner = WalkDirScanner::new(ScanConfig::default());
        let result = scanner.scan(&[temp_dir.path().to_path_buf()]).unwrap();

        assert_eq!(identities(&result), vec!["aardvark", "zebra"]);
    }

    #[test]
    fn hidden_directories_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), ".thumbnails/card.webp");
        touch(temp_dir.path(), "card.webp");

        let scanner = WalkDirScanner::new(ScanConfig::default());
        let result = scanner.scan(&[temp_dir.path().to_path_buf()]).unwrap();

        assert_eq!(result.images.len(), 1);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn duplicate_stems_keep_first_path() {
        let temp_dir = TempDir::new().unwrap();
        let first = touch(temp_dir.path(), "a/card.webp");
        let second = touch(temp_dir.path(), "b/card.png");

        let scanner = WalkDirScanner::new(ScanConfig::default());
        let result = scanner.scan(&[temp_dir.path().to_path_buf()]).unwrap();

        assert_eq!(result.images.len(), 1);
        assert_eq!(result.images[0].path, first);
        assert!(matches!(
            &result.errors[..],
            [ScanError::DuplicateIdentity { duplicate, .. }] if *duplicate == second
        ));
    }

    #[test]
    fn missing_root_is_reported_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "card.webp");

        let scanner = WalkDirScanner::new(ScanConfig::default());
        let result = scanner
            .scan(&[
                temp_dir.path().to_path_buf(),
                temp_dir.path().join("does-not-exist"),
            ])
            .unwrap();

        assert_eq!(result.images.len(), 1);
        assert!(matches!(
            result.errors[0],
            ScanError::DirectoryNotFound { .. }
        ));
    }

    #[test]
    fn max_depth_limits_recursion() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "top.webp");
        touch(temp_dir.path(), "sub/deep.webp");

        let config = ScanConfig {
            max_depth: Some(1),
            ..ScanConfig::default()
        };
        let result = WalkDirScanner::new(config)
            .scan(&[temp_dir.path().to_path_buf()])
            .unwrap();

        assert_eq!(identities(&result), vec!["top"]);
    }

    #[test]
    fn progress_events_are_sent() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "card.webp");

        let (sender, receiver) = crate::events::EventChannel::new();
        WalkDirScanner::new(ScanConfig::default())
            .scan_with_events(&[temp_dir.path().to_path_buf()], &sender)
            .unwrap();
        drop(sender);

        let events: Vec<Event> = receiver.iter().collect();
        assert!(matches!(events.first(), Some(Event::Scan(ScanEvent::Started { .. }))));
        assert!(matches!(
            events.last(),
            Some(Event::Scan(ScanEvent::Completed { total_images: 1 }))
        ));
    }
}
