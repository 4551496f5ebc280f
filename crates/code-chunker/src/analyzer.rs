//! Heuristic structural analysis
//!
//! Units are found by matching declaration regexes against lines that start at bracket
//! depth zero (or, for indentation-scoped languages, at column zero). A unit ends where its
//! statement ends according to [`CodeMap`]. Malformed input never fails: an unmatched region
//! simply has no unit and an unbalanced one runs to the end of the file.

use crate::language::Language;
use crate::patterns;
use crate::scanner::CodeMap;
use crate::types::{
    Complexity, ComplexityTier, FileAnalysis, Platform, StructuralUnit, UnitKind,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Score added per branching keyword or short-circuit operator
pub const BRANCH_WEIGHT: f32 = 1.5;
/// Score added per level of maximum block nesting
pub const NESTING_WEIGHT: f32 = 2.0;
/// Score added per structural unit
pub const UNIT_WEIGHT: f32 = 2.0;
/// Lines of code worth one point
pub const LINES_PER_POINT: f32 = 100.0;
/// Scores below this are `low`
pub const LOW_THRESHOLD: f32 = 10.0;
/// Scores below this (and not low) are `medium`
pub const MEDIUM_THRESHOLD: f32 = 30.0;

fn compile(pattern: &str) -> Option<Regex> {
    Regex::new(pattern)
        .map_err(|err| log::error!("Invalid analyzer regex {pattern:?}: {err}"))
        .ok()
}

fn is_match(regex: &Option<Regex>, text: &str) -> bool {
    regex.as_ref().is_some_and(|regex| regex.is_match(text))
}

#[derive(Clone, Copy)]
enum Decl {
    /// Class; becomes a component when it extends a component base
    Class,
    /// Function-like; hook, component or function depending on name and body
    Callable,
    Fixed(UnitKind),
}

struct DeclRule {
    decl: Decl,
    regex: Regex,
}

fn rules(table: &[(Decl, &str)]) -> Vec<DeclRule> {
    table
        .iter()
        .filter_map(|(decl, pattern)| {
            compile(pattern).map(|regex| DeclRule {
                decl: *decl,
                regex,
            })
        })
        .collect()
}

static ECMA_RULES: Lazy<Vec<DeclRule>> = Lazy::new(|| {
    rules(&[
        (
            Decl::Fixed(UnitKind::Other),
            r"^(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*StyleSheet\.create\s*\(",
        ),
        (
            Decl::Class,
            r"^(?:export\s+(?:default\s+)?)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)",
        ),
        (
            Decl::Callable,
            r"^(?:export\s+(?:default\s+)?)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)",
        ),
        (
            Decl::Callable,
            r"^(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)[^=]*=\s*(?:async\s*)?(?:function\b|(?:<[^>]*>\s*)?\([^)]*\)?\s*(?::[^=]*)?(?:=>|$)|[A-Za-z_$][\w$]*\s*=>|(?:React\.)?(?:memo|forwardRef)\s*[(<])",
        ),
        (
            Decl::Callable,
            r"^export\s+default\s+(?:async\s+)?(?:function\s*\*?\s*)?\(",
        ),
        (
            Decl::Fixed(UnitKind::Other),
            r"^(?:export\s+)?(?:declare\s+)?(?:const\s+)?(?:interface|enum)\s+([A-Za-z_$][\w$]*)",
        ),
        (
            Decl::Fixed(UnitKind::Other),
            r"^(?:export\s+)?type\s+([A-Za-z_$][\w$]*)[^=]*=\s*\{",
        ),
    ])
});

static INDENT_RULES: Lazy<Vec<DeclRule>> = Lazy::new(|| {
    rules(&[
        (Decl::Fixed(UnitKind::Class), r"^class\s+([A-Za-z_]\w*)"),
        (
            Decl::Fixed(UnitKind::Function),
            r"^(?:async\s+)?def\s+([A-Za-z_]\w*)",
        ),
    ])
});

static BRACE_RULES: Lazy<Vec<DeclRule>> = Lazy::new(|| {
    rules(&[
        (
            Decl::Fixed(UnitKind::Function),
            r#"^(?:pub(?:\([^)]*\))?\s+)?(?:(?:const|async|unsafe|extern(?:\s+"[^"]*")?)\s+)*fn\s+([A-Za-z_]\w*)"#,
        ),
        (
            Decl::Fixed(UnitKind::Class),
            r"^(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait|union)\s+([A-Za-z_]\w*)",
        ),
        (
            Decl::Fixed(UnitKind::Class),
            r"^(?:unsafe\s+)?impl\b(?:\s*<[^>]*>)?\s+(?:[\w:]+(?:<[^>]*>)?\s+for\s+)?([A-Za-z_][\w:]*)",
        ),
        (
            Decl::Fixed(UnitKind::Other),
            r"^(?:pub(?:\([^)]*\))?\s+)?mod\s+([A-Za-z_]\w*)\s*\{",
        ),
        (
            Decl::Fixed(UnitKind::Function),
            r"^func\s+(?:\([^)]*\)\s*)?([A-Za-z_]\w*)",
        ),
        (
            Decl::Fixed(UnitKind::Class),
            r"^(?:(?:public|private|protected|internal|static|final|abstract|sealed|data|open)\s+)*(?:class|interface|struct|object)\s+([A-Za-z_]\w*)",
        ),
        (
            Decl::Fixed(UnitKind::Function),
            r"^(?:function|fun)\s+([A-Za-z_]\w*)",
        ),
    ])
});

static EXTENDS_COMPONENT: Lazy<Option<Regex>> =
    Lazy::new(|| compile(r"\bextends\s+(?:React\.)?(?:Pure)?Component\b"));
static HOOK_NAME: Lazy<Option<Regex>> = Lazy::new(|| compile(r"^use[A-Z0-9]"));
static HOOK_CALL: Lazy<Option<Regex>> = Lazy::new(|| compile(r"\b(use[A-Z]\w*)\s*\("));
static BRANCHES: Lazy<Option<Regex>> = Lazy::new(|| {
    compile(r"\b(?:if|elif|for|while|switch|case|catch|except)\b|&&|\|\||\?\?|\s\?\s")
});
static PLATFORM_API: Lazy<Option<Regex>> = Lazy::new(|| compile(r"\bPlatform\.(?:OS|select)\b"));

static ECMA_IMPORTS: Lazy<Option<Regex>> = Lazy::new(|| {
    compile(
        r#"(?m)^\s*import\s+(?:[^'";]*?\s+from\s+)?['"]([^'"]+)['"]|\brequire\s*\(\s*['"]([^'"]+)['"]\s*\)|\bimport\s*\(\s*['"]([^'"]+)['"]"#,
    )
});
static PYTHON_IMPORTS: Lazy<Option<Regex>> =
    Lazy::new(|| compile(r"(?m)^\s*(?:from\s+([\w.]+)\s+import\b|import\s+([\w.]+))"));
static RUST_IMPORTS: Lazy<Option<Regex>> =
    Lazy::new(|| compile(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+([\w:]+)"));

static ECMA_NAMED_EXPORTS: Lazy<Option<Regex>> = Lazy::new(|| {
    compile(
        r"(?m)^\s*export\s+(?:declare\s+)?(?:async\s+)?(?:const|let|var|function\*?|class|interface|type|enum)\s+([A-Za-z_$][\w$]*)|\bexports\.([A-Za-z_$][\w$]*)\s*=",
    )
});
static ECMA_EXPORT_LIST: Lazy<Option<Regex>> =
    Lazy::new(|| compile(r"(?m)^\s*export\s+\{([^}]*)\}"));
static ECMA_DEFAULT_EXPORT: Lazy<Option<Regex>> = Lazy::new(|| {
    compile(r"(?m)^\s*export\s+default\b|\bmodule\.exports\s*=|\bexports\.default\b")
});
static RUST_EXPORTS: Lazy<Option<Regex>> = Lazy::new(|| {
    compile(
        r"(?m)^pub\s+(?:(?:const|async|unsafe)\s+)*(?:fn|struct|enum|trait|const|static|type|mod)\s+([A-Za-z_]\w*)",
    )
});

/// Bucket a complexity score with the fixed thresholds
pub fn tier_for(score: f32) -> ComplexityTier {
    if score < LOW_THRESHOLD {
        ComplexityTier::Low
    } else if score < MEDIUM_THRESHOLD {
        ComplexityTier::Medium
    } else {
        ComplexityTier::High
    }
}

/// Weighted complexity of a blanked code span
pub fn score_complexity(code: &str, nesting: usize, units: usize) -> Complexity {
    let branches = match &*BRANCHES {
        Some(regex) => regex.find_iter(code).count(),
        None => 0,
    };
    let lines = code.lines().filter(|line| !line.trim().is_empty()).count();
    let score = branches as f32 * BRANCH_WEIGHT
        + nesting as f32 * NESTING_WEIGHT
        + units as f32 * UNIT_WEIGHT
        + lines as f32 / LINES_PER_POINT;
    Complexity {
        score,
        tier: tier_for(score),
    }
}

/// Platform inferred from the file name, then from platform API usage
pub fn detect_platform(path: Option<&str>, text: &str) -> Platform {
    let file_name = path
        .map(|path| path.rsplit(['/', '\\']).next().unwrap_or(path))
        .unwrap_or_default();
    if file_name.contains(".ios.") {
        Platform::Ios
    } else if file_name.contains(".android.") {
        Platform::Android
    } else if is_match(&PLATFORM_API, text) {
        Platform::MultiPlatform
    } else {
        Platform::Universal
    }
}

/// Lexical structural analyzer
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralAnalyzer;

impl StructuralAnalyzer {
    pub const fn new() -> Self {
        Self
    }

    /// Analyze a file, detecting language and platform from its path
    pub fn analyze_file(&self, path: &str, text: &str) -> FileAnalysis {
        let mut analysis = self.analyze(text, Language::from_path(path));
        analysis.platform = detect_platform(Some(path), text);
        analysis
    }

    /// Analyze file text of a known language
    pub fn analyze(&self, text: &str, language: Language) -> FileAnalysis {
        let map = CodeMap::new(text, language);
        let units = find_units(&map, language);
        let code = map.code_text(0, text.len());

        let complexity = score_complexity(&code, map.max_nesting(0, text.len()), units.len());
        let hooks = if language.is_ecmascript() {
            distinct_captures(&HOOK_CALL, &code)
        } else {
            Vec::new()
        };

        log::trace!(
            "Analyzed {} bytes of {}: {} units, complexity {:.1}",
            text.len(),
            language,
            units.len(),
            complexity.score
        );

        FileAnalysis {
            language: Some(language),
            imports: find_imports(text, language),
            exports: find_exports(text, language, &units),
            hooks,
            patterns: patterns::detect(&code),
            complexity,
            platform: detect_platform(None, text),
            units,
        }
    }
}

fn find_units(map: &CodeMap<'_>, language: Language) -> Vec<StructuralUnit> {
    let (table, require_block): (&[DeclRule], bool) = if language.is_ecmascript() {
        (ECMA_RULES.as_slice(), false)
    } else if language.is_indent_scoped() {
        (INDENT_RULES.as_slice(), false)
    } else {
        (BRACE_RULES.as_slice(), true)
    };

    let depths = map.depth_at_line_starts();
    let mut units = Vec::new();
    let mut cursor = 0usize;

    for line in 0..map.line_count() {
        let start = map.line_start(line);
        if start < cursor || depths.get(line).copied().unwrap_or(0) != 0 {
            continue;
        }
        let raw = map.line_text(line);
        let trimmed = raw.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        let indent = raw.len() - trimmed.len();
        if language.is_indent_scoped() && indent > 0 {
            continue;
        }
        let offset = start + indent;
        if !map.is_code(offset) {
            continue;
        }

        let Some((decl, name)) = match_declaration(table, trimmed) else {
            continue;
        };
        let end = if language.is_indent_scoped() {
            map.indented_block_end(line)
        } else {
            map.statement_end(offset, require_block)
        };
        if end <= start {
            continue;
        }

        let code = map.code_text(start, end);
        let kind = resolve_kind(decl, &name, &map.text()[start..end], language);
        let complexity = score_complexity(&code, map.max_nesting(start, end), 1);
        units.push(StructuralUnit {
            kind,
            name,
            start,
            end,
            patterns: patterns::detect(&code),
            complexity: complexity.tier,
        });
        cursor = end;
    }

    units
}

fn match_declaration(table: &[DeclRule], line: &str) -> Option<(Decl, String)> {
    table.iter().find_map(|rule| {
        rule.regex.captures(line).map(|caps| {
            let name = caps
                .get(1)
                .map_or_else(|| "default".to_string(), |m| m.as_str().to_string());
            (rule.decl, name)
        })
    })
}

fn resolve_kind(decl: Decl, name: &str, text: &str, language: Language) -> UnitKind {
    match decl {
        Decl::Fixed(kind) => kind,
        Decl::Class => {
            if is_match(&EXTENDS_COMPONENT, text) {
                UnitKind::Component
            } else {
                UnitKind::Class
            }
        }
        Decl::Callable => {
            let capitalized = name.chars().next().is_some_and(char::is_uppercase);
            if is_match(&HOOK_NAME, name) {
                UnitKind::Hook
            } else if capitalized
                && language.allows_jsx()
                && (text.contains("</") || text.contains("/>"))
            {
                UnitKind::Component
            } else {
                UnitKind::Function
            }
        }
    }
}

fn distinct_captures(regex: &Option<Regex>, text: &str) -> Vec<String> {
    let Some(regex) = regex else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for caps in regex.captures_iter(text) {
        let Some(m) = caps.iter().skip(1).flatten().next() else {
            continue;
        };
        if seen.insert(m.as_str()) {
            out.push(m.as_str().to_string());
        }
    }
    out
}

fn find_imports(text: &str, language: Language) -> Vec<String> {
    if language.is_ecmascript() {
        distinct_captures(&ECMA_IMPORTS, text)
    } else if language.is_indent_scoped() {
        distinct_captures(&PYTHON_IMPORTS, text)
    } else if language == Language::Rust {
        distinct_captures(&RUST_IMPORTS, text)
    } else {
        Vec::new()
    }
}

fn find_exports(text: &str, language: Language, units: &[StructuralUnit]) -> Vec<String> {
    let mut exports = if language.is_ecmascript() {
        let mut names: Vec<String> = distinct_captures(&ECMA_NAMED_EXPORTS, text)
            .into_iter()
            .filter(|name| name != "default")
            .collect();
        if let Some(regex) = &*ECMA_EXPORT_LIST {
            for caps in regex.captures_iter(text) {
                let Some(list) = caps.get(1) else { continue };
                for item in list.as_str().split(',') {
                    let exported = item.rsplit(" as ").next().unwrap_or(item).trim();
                    if !exported.is_empty() && !names.iter().any(|name| name == exported) {
                        names.push(exported.to_string());
                    }
                }
            }
        }
        if is_match(&ECMA_DEFAULT_EXPORT, text) && !names.iter().any(|name| name == "default") {
            names.push("default".to_string());
        }
        names
    } else if language.is_indent_scoped() {
        units
            .iter()
            .filter(|unit| !unit.name.starts_with('_'))
            .map(|unit| unit.name.clone())
            .collect()
    } else if language == Language::Rust {
        distinct_captures(&RUST_EXPORTS, text)
    } else {
        Vec::new()
    };
    exports.dedup();
    exports
}
