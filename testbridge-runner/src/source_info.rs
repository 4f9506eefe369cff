// Copyright (c) The testbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Best-effort lookup of the source file and line for a test method.
//!
//! Source information is read from the debug information of the test binary and any additional
//! modules passed in. Lookup never fails: if anything goes wrong, the location is reported as
//! absent.

use camino::{Utf8Path, Utf8PathBuf};
use object::{Object, ObjectSymbol, SymbolKind};
use std::collections::HashMap;
use testbridge_metadata::{SourceInformation, TestCaseDescriptor};
use tracing::debug;

/// Resolves source locations for test cases.
pub trait SourceInformationProvider {
    /// Returns the source location of the test method, if it can be found.
    fn source_information(&self, test_case: &TestCaseDescriptor) -> Option<SourceInformation>;
}

/// A provider that never resolves anything.
///
/// This is a zero-sized type, so boxing it does not allocate.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSourceInformationProvider;

impl NullSourceInformationProvider {
    /// The shared instance.
    pub const INSTANCE: Self = Self;
}

impl SourceInformationProvider for NullSourceInformationProvider {
    fn source_information(&self, _test_case: &TestCaseDescriptor) -> Option<SourceInformation> {
        None
    }
}

/// Creates the provider to use for a run.
///
/// If `collect` is false, or the test binary does not exist, returns the shared null provider.
pub fn create(
    test_binary: &Utf8Path,
    collect: bool,
    extra_modules: &[Utf8PathBuf],
) -> Box<dyn SourceInformationProvider> {
    if !collect || !test_binary.is_file() {
        debug!(%test_binary, collect, "not collecting source information");
        return Box::new(NullSourceInformationProvider::INSTANCE);
    }

    let modules = std::iter::once(test_binary)
        .chain(extra_modules.iter().map(Utf8PathBuf::as_path))
        .filter(|path| !is_denylisted(path))
        .filter_map(ModuleDebugInfo::load)
        .collect();
    Box::new(DebugInfoSourceProvider { modules })
}

// Toolchain libraries never contain test code.
const DENYLISTED_MODULE_PREFIXES: &[&str] = &["libstd-", "libtest-", "librustc_driver-"];

fn is_denylisted(path: &Utf8Path) -> bool {
    path.file_name().is_some_and(|name| {
        DENYLISTED_MODULE_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix))
    })
}

/// Resolves source locations out of DWARF debug information.
pub struct DebugInfoSourceProvider {
    modules: Vec<ModuleDebugInfo>,
}

impl SourceInformationProvider for DebugInfoSourceProvider {
    fn source_information(&self, test_case: &TestCaseDescriptor) -> Option<SourceInformation> {
        let path = symbol_path(&test_case.type_name, &test_case.method_name);
        self.modules
            .iter()
            .find_map(|module| module.resolve(&path))
    }
}

struct ModuleDebugInfo {
    path: Utf8PathBuf,
    loader: addr2line::Loader,
    // Demangled function paths (without hashes) to their address ranges.
    functions: HashMap<String, Vec<FunctionRange>>,
}

impl ModuleDebugInfo {
    fn load(path: &Utf8Path) -> Option<Self> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(error) => {
                debug!(%path, %error, "failed to read module");
                return None;
            }
        };
        let file = match object::File::parse(&*data) {
            Ok(file) => file,
            Err(error) => {
                debug!(%path, %error, "failed to parse module");
                return None;
            }
        };

        let mut functions: HashMap<String, Vec<FunctionRange>> = HashMap::new();
        for symbol in file.symbols() {
            if symbol.kind() != SymbolKind::Text {
                continue;
            }
            let Ok(name) = symbol.name() else {
                continue;
            };
            let demangled = format!("{:#}", rustc_demangle::demangle(name));
            let range = FunctionRange {
                address: symbol.address(),
                size: symbol.size(),
            };
            let ranges = functions.entry(demangled).or_default();
            if !ranges.iter().any(|existing| existing.address == range.address) {
                ranges.push(range);
            }
        }

        let loader = match addr2line::Loader::new(path) {
            Ok(loader) => loader,
            Err(error) => {
                debug!(%path, %error, "failed to load debug information");
                return None;
            }
        };

        Some(Self {
            path: path.to_owned(),
            loader,
            functions,
        })
    }

    fn resolve(&self, symbol_path: &str) -> Option<SourceInformation> {
        let suffix = format!("::{symbol_path}");
        let mut candidates = self
            .functions
            .iter()
            .filter(|(name, _)| *name == symbol_path || name.ends_with(&suffix))
            .flat_map(|(_, ranges)| ranges.iter().copied());

        // Overloads (or monomorphizations) are ambiguous.
        let range = candidates.next()?;
        if candidates.next().is_some() {
            debug!(path = %self.path, symbol_path, "ambiguous symbol, not resolving");
            return None;
        }

        let rows = match self.loader.find_location_range(range.address, range.end()) {
            Ok(rows) => rows,
            Err(error) => {
                debug!(path = %self.path, symbol_path, %error, "failed to look up location");
                return None;
            }
        };

        // The first row with a real line wins. Failing that, report the file of the first row
        // that has one.
        let mut file_only = None;
        for (_, _, location) in rows {
            let Some(file_name) = location.file else {
                continue;
            };
            match location.line {
                Some(line) if line != HIDDEN_LINE => {
                    return Some(SourceInformation {
                        file_name: file_name.into(),
                        line_number: Some(line),
                    });
                }
                _ => {
                    file_only.get_or_insert_with(|| SourceInformation {
                        file_name: file_name.into(),
                        line_number: None,
                    });
                }
            }
        }
        file_only
    }
}

#[derive(Clone, Copy, Debug)]
struct FunctionRange {
    address: u64,
    size: u64,
}

impl FunctionRange {
    // Exclusive end. Symbols without a size still cover their first instruction.
    fn end(self) -> u64 {
        self.address.saturating_add(self.size.max(1))
    }
}

// Line 0 in a DWARF line table means the code has no corresponding source line.
const HIDDEN_LINE: u32 = 0;

// `Ns.Outer+Inner` and `Method` map to `Ns::Outer::Inner::Method`.
fn symbol_path(type_name: &str, method_name: &str) -> String {
    let mut path = type_name.replace(['.', '+'], "::");
    if !path.is_empty() {
        path.push_str("::");
    }
    path.push_str(method_name);
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Ns.Type", "method", "Ns::Type::method"; "namespaced")]
    #[test_case("Ns.Outer+Inner", "method", "Ns::Outer::Inner::method"; "nested")]
    #[test_case("", "method", "method"; "free function")]
    fn symbol_paths(type_name: &str, method_name: &str, expected: &str) {
        assert_eq!(symbol_path(type_name, method_name), expected);
    }

    #[test_case("libstd-8f3a2b.so", true)]
    #[test_case("libtest-8f3a2b.so", true)]
    #[test_case("my_tests-8f3a2b", false)]
    fn denylist(file_name: &str, expected: bool) {
        assert_eq!(is_denylisted(Utf8Path::new("/deps").join(file_name).as_path()), expected);
    }

    #[test]
    fn missing_binary_uses_null_provider() {
        let provider = create(Utf8Path::new("/nonexistent/test-binary"), true, &[]);
        let test_case = TestCaseDescriptor::new("a", "a", "Tests", "Ns.Type", "method");
        assert_eq!(provider.source_information(&test_case), None);
    }

    #[inline(never)]
    fn resolution_target() -> u32 {
        std::hint::black_box(42)
    }

    #[test]
    fn resolves_function_in_current_exe() {
        assert_eq!(resolution_target(), 42);
        let exe = Utf8PathBuf::try_from(std::env::current_exe().unwrap()).unwrap();
        let provider = create(&exe, true, &[]);

        let test_case = TestCaseDescriptor::new(
            "a",
            "a",
            "Tests",
            "source_info.tests",
            "resolution_target",
        );
        let info = provider
            .source_information(&test_case)
            .expect("function in the test binary was resolved");
        assert!(
            info.file_name.as_str().ends_with("source_info.rs"),
            "unexpected file {}",
            info.file_name
        );
        assert!(info.line_number.is_some(), "a line was found");
    }

    #[test]
    fn function_range_end() {
        let range = FunctionRange {
            address: 0x1000,
            size: 0x40,
        };
        assert_eq!(range.end(), 0x1040);
        let sizeless = FunctionRange {
            address: 0x1000,
            size: 0,
        };
        assert_eq!(sizeless.end(), 0x1001);
    }

    #[test]
    fn unparseable_binary_resolves_nothing() {
        let dir = camino_tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-binary");
        std::fs::write(&path, b"hello").unwrap();

        let provider = create(&path, true, &[]);
        let test_case = TestCaseDescriptor::new("a", "a", "Tests", "Ns.Type", "method");
        assert_eq!(provider.source_information(&test_case), None);
    }
}
