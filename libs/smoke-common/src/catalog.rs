//! Compiler catalog contract
//!
//! The engine only ever talks to the compilation service through this trait:
//! listing compilers, resolving one by name and version, and submitting
//! compile or execute requests. Implementations must be safe to share across
//! concurrent evaluations.

use crate::types::{CompileFilters, CompilerDescriptor, LanguageId, RawOutcome};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("compilation service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("compilation service error: {0}")]
    ServiceError(String),

    #[error("no {language} compiler matches '{name}' version '{version}'")]
    NotFound {
        language: LanguageId,
        name: String,
        version: String,
    },
}

#[async_trait]
pub trait CompilerCatalog: Send + Sync {
    async fn list_compilers(&self, language: &LanguageId) -> Result<Vec<CompilerDescriptor>, CatalogError>;

    async fn compile(
        &self,
        compiler: &CompilerDescriptor,
        source_code: &str,
        filters: &CompileFilters,
    ) -> Result<RawOutcome, CatalogError>;

    async fn execute(
        &self,
        compiler: &CompilerDescriptor,
        source_code: &str,
    ) -> Result<RawOutcome, CatalogError>;

    /// Resolve a single compiler by name pattern and version.
    ///
    /// First match in catalog order wins.
    async fn find_compiler(
        &self,
        language: &LanguageId,
        name_pattern: &str,
        version: &str,
    ) -> Result<CompilerDescriptor, CatalogError> {
        let compilers = self.list_compilers(language).await?;

        compilers
            .into_iter()
            .find(|c| matches_lookup(c, name_pattern, version))
            .ok_or_else(|| CatalogError::NotFound {
                language: language.clone(),
                name: name_pattern.to_string(),
                version: version.to_string(),
            })
    }
}

/// Name matches id or display name (case-insensitive); version matches semver
/// exactly or appears in the display name
pub fn matches_lookup(compiler: &CompilerDescriptor, name_pattern: &str, version: &str) -> bool {
    let pattern = name_pattern.to_lowercase();
    let name_ok = compiler.id.to_lowercase().contains(&pattern)
        || compiler.display_name.to_lowercase().contains(&pattern);
    let version_ok = compiler.semver.as_deref() == Some(version) || compiler.display_name.contains(version);

    name_ok && version_ok
}
