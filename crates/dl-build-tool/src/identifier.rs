use crate::error::CompileError;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Generate the symbol prefix for a mesh file (e.g. `models/Mario Body.obj`
/// → `mario_body`).
pub fn generate_identifier(path: &Path) -> Result<String, CompileError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| CompileError::ObjParse {
            path: path.to_path_buf(),
            message: "invalid file name".to_string(),
        })?;

    Ok(sanitize_c_ident(stem).to_lowercase())
}

/// Sanitize a string to a valid C identifier.
pub fn sanitize_c_ident(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 1);

    for (i, ch) in s.chars().enumerate() {
        if i == 0 && ch.is_ascii_digit() {
            result.push('_');
            result.push(ch);
        } else if ch.is_ascii_alphanumeric() || ch == '_' {
            result.push(ch);
        } else {
            result.push('_');
        }
    }

    if result.is_empty() {
        result.push('_');
    }

    result
}

/// Distinct identifiers for names from one namespace (materials, bones,
/// switches). A sanitized name that is already taken gets the first free
/// `_1`, `_2`, ... suffix.
#[derive(Debug, Default)]
pub struct NameAllocator {
    used: HashSet<String>,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, name: &str) -> String {
        let base = sanitize_c_ident(name);
        let mut candidate = base.clone();
        let mut counter = 0;
        while self.used.contains(&candidate) {
            counter += 1;
            candidate = format!("{base}_{counter}");
        }
        self.used.insert(candidate.clone());
        candidate
    }
}

/// Every symbol emitted by one compile, with what claimed it.
#[derive(Debug, Default)]
pub struct SymbolTable {
    owners: HashMap<String, String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` for `origin`.
    ///
    /// Returns `Err(SymbolCollision)` naming both claimants if the name is
    /// already taken.
    pub fn register(&mut self, name: &str, origin: &str) -> Result<(), CompileError> {
        if let Some(previous) = self.owners.get(name) {
            return Err(CompileError::SymbolCollision {
                name: name.to_string(),
                first: previous.clone(),
                second: origin.to_string(),
            });
        }
        self.owners.insert(name.to_string(), origin.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    // --- sanitize ---

    #[test]
    fn test_sanitize_simple() {
        assert_eq!(sanitize_c_ident("body"), "body");
        assert_eq!(sanitize_c_ident("mat_skin"), "mat_skin");
    }

    #[test]
    fn test_sanitize_special_chars() {
        assert_eq!(sanitize_c_ident("left-arm"), "left_arm");
        assert_eq!(sanitize_c_ident("Material.001"), "Material_001");
        assert_eq!(sanitize_c_ident("a b"), "a_b");
    }

    #[test]
    fn test_sanitize_leading_digit() {
        assert_eq!(sanitize_c_ident("3d-cube"), "_3d_cube");
    }

    #[test]
    fn test_sanitize_empty() {
        assert_eq!(sanitize_c_ident(""), "_");
    }

    #[test]
    fn test_generate_identifier() {
        let path = PathBuf::from("models/Mario Body.obj");
        assert_eq!(generate_identifier(&path).unwrap(), "mario_body");
    }

    // --- allocation ---

    #[test]
    fn test_allocator_suffixes_sanitized_duplicates() {
        let mut names = NameAllocator::new();
        assert_eq!(names.allocate("Mat.001"), "Mat_001");
        assert_eq!(names.allocate("Mat_001"), "Mat_001_1");
        assert_eq!(names.allocate("Mat-001"), "Mat_001_2");
        assert_eq!(names.allocate("body"), "body");
    }

    #[test]
    fn test_allocator_skips_taken_suffix() {
        let mut names = NameAllocator::new();
        assert_eq!(names.allocate("a_1"), "a_1");
        assert_eq!(names.allocate("a"), "a");
        assert_eq!(names.allocate("a.b"), "a_b");
        assert_eq!(names.allocate("a"), "a_2");
    }

    // --- symbol table ---

    #[test]
    fn test_collision_reports_both_origins() {
        let mut table = SymbolTable::new();
        table.register("mesh_mat_a_b", "material 'a.b'").unwrap();
        let err = table
            .register("mesh_mat_a_b", "material 'a-b'")
            .unwrap_err();
        match err {
            CompileError::SymbolCollision {
                name,
                first,
                second,
            } => {
                assert_eq!(name, "mesh_mat_a_b");
                assert_eq!(first, "material 'a.b'");
                assert_eq!(second, "material 'a-b'");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(table.len(), 1);
    }
}
