use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::compiler::{compile_program, CompilerOptions};
use crate::error::{PipelineError, PipelineResult};
use crate::types::{CompileResult, Diagnostic};

/// Compiles slower than this are logged; they are never cut short
const SLOW_COMPILE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
struct OpenDocument {
    text: String,
    version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheKey {
    uri: String,
    version: u64,
    digest: [u8; 32],
    /// Bumped on any document change, so edits to ambient files invalidate
    generation: u64,
}

/// In-memory program of open documents plus the most recent compile
pub struct LanguageService {
    documents: BTreeMap<String, OpenDocument>,
    options: CompilerOptions,
    generation: u64,
    cache: Option<(CacheKey, CompileResult)>,
    compile_count: usize,
}

impl LanguageService {
    pub fn new() -> Self {
        Self {
            documents: BTreeMap::new(),
            options: CompilerOptions::default(),
            generation: 0,
            cache: None,
            compile_count: 0,
        }
    }

    /// Open or update a document. Returns its version, which only moves when
    /// the text actually changes.
    pub fn sync_document(&mut self, uri: &str, text: String) -> u64 {
        match self.documents.get_mut(uri) {
            Some(doc) if doc.text == text => doc.version,
            Some(doc) => {
                doc.text = text;
                doc.version += 1;
                self.generation += 1;
                doc.version
            }
            None => {
                self.documents
                    .insert(uri.to_string(), OpenDocument { text, version: 1 });
                self.generation += 1;
                1
            }
        }
    }

    /// Remove a document from the program; returns whether it was open
    pub fn close_document(&mut self, uri: &str) -> bool {
        let removed = self.documents.remove(uri).is_some();
        if removed {
            self.generation += 1;
            if self.cache.as_ref().is_some_and(|(key, _)| key.uri == uri) {
                self.cache = None;
            }
        }
        removed
    }

    pub fn is_open(&self, uri: &str) -> bool {
        self.documents.contains_key(uri)
    }

    /// Number of compiles actually performed
    pub fn compile_count(&self) -> usize {
        self.compile_count
    }

    /// Compile `uri` against the current program
    pub fn get_output(&mut self, uri: &str) -> PipelineResult<CompileResult> {
        let key = self.cache_key(uri)?;
        let result = self.compile(uri, key.version)?;
        self.cache = Some((key, result.clone()));
        Ok(result)
    }

    /// Diagnostics for `uri`, reusing the last compile when it is still fresh
    pub fn get_diagnostics(&mut self, uri: &str) -> PipelineResult<Vec<Diagnostic>> {
        let key = self.cache_key(uri)?;
        if let Some((cached, result)) = &self.cache {
            if *cached == key {
                debug!(uri, version = key.version, "diagnostics served from cache");
                return Ok(result.diagnostics.clone());
            }
        }
        Ok(self.get_output(uri)?.diagnostics)
    }

    fn cache_key(&self, uri: &str) -> PipelineResult<CacheKey> {
        let doc = self
            .documents
            .get(uri)
            .ok_or_else(|| PipelineError::UnknownDocument(uri.to_string()))?;
        Ok(CacheKey {
            uri: uri.to_string(),
            version: doc.version,
            digest: Sha256::digest(doc.text.as_bytes()).into(),
            generation: self.generation,
        })
    }

    fn compile(&mut self, uri: &str, version: u64) -> PipelineResult<CompileResult> {
        let started = Instant::now();
        let files = self
            .documents
            .iter()
            .map(|(uri, doc)| (uri.as_str(), doc.text.as_str()));
        let compilation = compile_program(files, uri, &self.options)
            .ok_or_else(|| PipelineError::UnknownDocument(uri.to_string()))?;
        self.compile_count += 1;

        let elapsed = started.elapsed();
        if elapsed > SLOW_COMPILE {
            warn!(uri, elapsed_ms = elapsed.as_millis() as u64, "slow compile");
        }

        let diagnostics: Vec<Diagnostic> = compilation
            .diagnostics
            .into_iter()
            .filter(|d| d.file == uri)
            .collect();
        debug!(uri, version, diagnostics = diagnostics.len(), "compiled document");

        Ok(CompileResult {
            uri: uri.to_string(),
            version,
            script: compilation.script,
            ast: compilation.ast,
            source_map: compilation.source_map,
            diagnostics,
        })
    }
}

impl Default for LanguageService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAIN: &str = "inmemory://model/main.flow";
    const LIB: &str = "inmemory://model/lib.flow";

    #[test]
    fn test_versions_follow_text_changes() {
        let mut service = LanguageService::new();
        assert_eq!(service.sync_document(MAIN, "print(1)".into()), 1);
        assert_eq!(service.sync_document(MAIN, "print(1)".into()), 1);
        assert_eq!(service.sync_document(MAIN, "print(2)".into()), 2);
    }

    #[test]
    fn test_get_output() {
        let mut service = LanguageService::new();
        service.sync_document(MAIN, "console.log(\"hi\")".into());

        let result = service.get_output(MAIN).unwrap();
        assert_eq!(result.uri, MAIN);
        assert_eq!(result.version, 1);
        assert_eq!(result.script, "print(\"hi\")\n");
        assert!(result.diagnostics.is_empty());
        assert!(!result.source_map.is_empty());
    }

    #[test]
    fn test_unknown_document() {
        let mut service = LanguageService::new();
        assert!(matches!(
            service.get_output(MAIN),
            Err(PipelineError::UnknownDocument(uri)) if uri == MAIN
        ));
        assert!(service.get_diagnostics(MAIN).is_err());
    }

    #[test]
    fn test_diagnostics_filtered_to_document() {
        let mut service = LanguageService::new();
        service.sync_document(MAIN, "print(1)".into());
        service.sync_document(LIB, "print(missing)".into());

        assert!(service.get_output(MAIN).unwrap().diagnostics.is_empty());
        let lib = service.get_diagnostics(LIB).unwrap();
        assert_eq!(lib.len(), 1);
        assert_eq!(lib[0].code, "undefined-variable");
    }

    #[test]
    fn test_ambient_library_document() {
        let mut service = LanguageService::new();
        service.sync_document(MAIN, "print(hostName)".into());
        assert_eq!(service.get_diagnostics(MAIN).unwrap().len(), 1);

        service.sync_document(LIB, "declare const hostName;".into());
        assert!(service.get_diagnostics(MAIN).unwrap().is_empty());

        service.close_document(LIB);
        assert_eq!(service.get_diagnostics(MAIN).unwrap().len(), 1);
    }

    #[test]
    fn test_diagnostics_reuse_fresh_output() {
        let mut service = LanguageService::new();
        service.sync_document(MAIN, "let x = 1".into());

        service.get_output(MAIN).unwrap();
        assert_eq!(service.compile_count(), 1);

        let diagnostics = service.get_diagnostics(MAIN).unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, "unused-variable");
        assert_eq!(service.compile_count(), 1);

        service.sync_document(MAIN, "let y = 1".into());
        service.get_diagnostics(MAIN).unwrap();
        assert_eq!(service.compile_count(), 2);
    }

    #[test]
    fn test_close_document() {
        let mut service = LanguageService::new();
        service.sync_document(MAIN, "print(1)".into());
        assert!(service.close_document(MAIN));
        assert!(!service.close_document(MAIN));
        assert!(!service.is_open(MAIN));
    }
}
