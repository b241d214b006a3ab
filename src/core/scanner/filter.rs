//! File filtering logic for the scanner.

use std::collections::HashSet;
use std::path::Path;

const DEFAULT_EXTENSIONS: [&str; 8] = ["webp", "png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff"];

/// Filters files to determine if they are supported images
pub struct ImageFilter {
    extensions: HashSet<String>,
    include_hidden: bool,
}

impl ImageFilter {
    /// Create a filter accepting every decodable card format
    pub fn new() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            include_hidden: false,
        }
    }

    /// Include hidden files (starting with .)
    pub fn with_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Override the accepted extensions; matching ignores case and a
    /// leading dot
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    pub fn is_hidden(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with('.'))
    }

    /// Check if a file should be included
    pub fn should_include(&self, path: &Path) -> bool {
        if !self.include_hidden && Self::is_hidden(path) {
            return false;
        }

        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_lowercase()))
    }
}

impl Default for ImageFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_card_formats_in_any_case() {
        let filter = ImageFilter::new();
        assert!(filter.should_include(Path::new("a/card.webp")));
        assert!(filter.should_include(Path::new("a/card.WEBP")));
        assert!(filter.should_include(Path::new("a/card.Jpeg")));
        assert!(!filter.should_include(Path::new("a/card.txt")));
        assert!(!filter.should_include(Path::new("a/card")));
    }

    #[test]
    fn hidden_files_need_opt_in() {
        let path = Path::new("a/.card.webp");
        assert!(!ImageFilter::new().should_include(path));
        assert!(ImageFilter::new().with_hidden(true).should_include(path));
    }

    #[test]
    fn custom_extensions_replace_defaults() {
        let filter = ImageFilter::new().with_extensions(vec![".WebP".to_string()]);
        assert!(filter.should_include(Path::new("card.webp")));
        assert!(!filter.should_include(Path::new("card.png")));
    }
}
