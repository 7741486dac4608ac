//! Posting locations
//!
//! Every task carries the place it was posted from. The location is used for
//! diagnostics only and never influences scheduling.

use std::fmt;

/// Where a task was posted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    module_path: Option<&'static str>,
    file_name: &'static str,
    line: u32,
    column: u32,
}

impl Location {
    /// Create a location from its parts. Usually built by [`from_here!`](crate::from_here).
    pub const fn new(
        module_path: &'static str,
        file_name: &'static str,
        line: u32,
        column: u32,
    ) -> Self {
        Self {
            module_path: Some(module_path),
            file_name,
            line,
            column,
        }
    }

    /// Location of the caller of the current `#[track_caller]` function
    #[track_caller]
    pub fn caller() -> Self {
        let caller = std::panic::Location::caller();
        Self {
            module_path: None,
            file_name: caller.file(),
            line: caller.line(),
            column: caller.column(),
        }
    }

    /// A location without source information
    pub const fn unknown() -> Self {
        Self {
            module_path: None,
            file_name: "",
            line: 0,
            column: 0,
        }
    }

    /// Whether file and line information is available
    pub fn has_source_info(&self) -> bool {
        !self.file_name.is_empty()
    }

    /// Module path of the posting code, when known
    pub fn module_path(&self) -> Option<&'static str> {
        self.module_path
    }

    /// Source file of the posting code
    pub fn file_name(&self) -> &'static str {
        self.file_name
    }

    /// Line number, 0 when unknown
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Column number, 0 when unknown
    pub fn column(&self) -> u32 {
        self.column
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::unknown()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_source_info() {
            return f.write_str("<unknown>");
        }

        match self.module_path {
            Some(module) => write!(f, "{}@{}:{}", module, self.file_name, self.line),
            None => write!(f, "{}:{}", self.file_name, self.line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn capture() -> Location {
        Location::caller()
    }

    #[test]
    fn test_from_here_captures_source() {
        let here = crate::from_here!();
        assert!(here.has_source_info());
        assert!(here.file_name().ends_with("location.rs"));
        assert_eq!(here.module_path(), Some(module_path!()));
        assert!(here.line() > 0);
    }

    #[test]
    fn test_caller_location() {
        let line = line!() + 1;
        let loc = capture();
        assert_eq!(loc.line(), line);
        assert!(loc.module_path().is_none());
        assert_eq!(loc.to_string(), format!("{}:{}", loc.file_name(), line));
    }

    #[test]
    fn test_unknown_location() {
        let loc = Location::default();
        assert!(!loc.has_source_info());
        assert_eq!(loc.to_string(), "<unknown>");
    }

    #[test]
    fn test_display_with_module() {
        let loc = Location::new("app::net", "src/net.rs", 42, 7);
        assert_eq!(loc.to_string(), "app::net@src/net.rs:42");
        assert_eq!(loc.column(), 7);
    }
}
