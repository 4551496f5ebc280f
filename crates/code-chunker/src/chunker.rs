use crate::analyzer::{score_complexity, StructuralAnalyzer};
use crate::config::ChunkerConfig;
use crate::error::{ChunkerError, Result};
use crate::language::Language;
use crate::patterns;
use crate::scanner::CodeMap;
use crate::strategy::split_region;
use crate::types::{ChunkMetadata, ChunkPart, CodeChunk, FileAnalysis, StructuralUnit};

/// Span of a file that becomes one or more chunks
#[derive(Debug, Clone, Copy)]
struct Region<'u> {
    start: usize,
    end: usize,
    unit: Option<&'u StructuralUnit>,
}

/// Main chunker interface for processing code
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
    analyzer: StructuralAnalyzer,
}

impl Chunker {
    /// Create a new chunker with validated configuration
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate().map_err(ChunkerError::invalid_config)?;
        Ok(Self {
            config,
            analyzer: StructuralAnalyzer::new(),
        })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Analyze then chunk a file
    pub fn chunk_str(&self, file_path: &str, text: &str) -> Result<(FileAnalysis, Vec<CodeChunk>)> {
        let analysis = self.analyzer.analyze_file(file_path, text);
        let chunks = self.chunk(file_path, text, &analysis)?;
        Ok((analysis, chunks))
    }

    /// Split `text` into chunks that cover it completely, keeping units intact where they fit
    pub fn chunk(
        &self,
        file_path: &str,
        text: &str,
        analysis: &FileAnalysis,
    ) -> Result<Vec<CodeChunk>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let language = analysis
            .language
            .unwrap_or_else(|| Language::from_path(file_path));
        let map = CodeMap::new(text, language);
        let regions = self.plan_regions(text, &analysis.units);

        let mut chunks = Vec::new();
        for region in regions {
            let pieces = split_region(text, region.start, region.end, &self.config);
            let total = pieces.len();
            for (part, piece) in pieces.into_iter().enumerate() {
                let mut metadata = match region.unit {
                    Some(unit) => ChunkMetadata::with_language(language)
                        .unit(unit)
                        .complexity(unit.complexity)
                        .patterns(unit.patterns.clone()),
                    None => {
                        let code = map.code_text(piece.start, piece.end);
                        let complexity =
                            score_complexity(&code, map.max_nesting(piece.start, piece.end), 0);
                        ChunkMetadata::with_language(language)
                            .complexity(complexity.tier)
                            .patterns(patterns::detect(&code))
                    }
                };
                if total > 1 {
                    metadata.part = Some(ChunkPart { index: part, total });
                }
                metadata.imports = analysis.imports.clone();
                metadata.exports = analysis.exports.clone();
                metadata.hooks = analysis.hooks.clone();
                metadata.platform = analysis.platform;

                chunks.push(CodeChunk {
                    file_path: file_path.to_string(),
                    index: chunks.len(),
                    start: piece.start,
                    end: piece.end,
                    overlap: piece.body_start - piece.start,
                    start_line: map.line_of(piece.start) + 1,
                    end_line: map.line_of(piece.end.saturating_sub(1)) + 1,
                    content: text[piece.start..piece.end].to_string(),
                    metadata,
                });
            }
        }

        verify_coverage(&chunks, text.len())?;
        log::trace!("Chunked {file_path} into {} chunks", chunks.len());
        Ok(chunks)
    }

    /// Assign every byte of the file to a region; gaps fold into the following unit
    fn plan_regions<'u>(&self, text: &str, units: &'u [StructuralUnit]) -> Vec<Region<'u>> {
        let max = self.config.max_chunk_size;
        let chars = |start: usize, end: usize| text[start..end].chars().count();
        let mut regions: Vec<Region<'u>> = Vec::new();
        let mut cursor = 0usize;

        for unit in units {
            if unit.end <= cursor || unit.end > text.len() || !text.is_char_boundary(unit.end) {
                continue;
            }
            let start = if unit.start < cursor || !text.is_char_boundary(unit.start) {
                cursor
            } else {
                unit.start
            };

            if start > cursor && chars(cursor, unit.end) > max && chars(start, unit.end) <= max {
                regions.push(Region {
                    start: cursor,
                    end: start,
                    unit: None,
                });
                regions.push(Region {
                    start,
                    end: unit.end,
                    unit: Some(unit),
                });
            } else {
                regions.push(Region {
                    start: cursor,
                    end: unit.end,
                    unit: Some(unit),
                });
            }
            cursor = unit.end;
        }

        if cursor < text.len() {
            let fold_tail = text[cursor..].trim().is_empty()
                && regions
                    .last()
                    .is_some_and(|last| chars(last.start, text.len()) <= max);
            match regions.last_mut() {
                Some(last) if fold_tail => last.end = text.len(),
                _ => regions.push(Region {
                    start: cursor,
                    end: text.len(),
                    unit: None,
                }),
            }
        }

        regions
    }
}

/// Chunks must tile `[0, len)`: each body starts where the previous chunk ended
fn verify_coverage(chunks: &[CodeChunk], len: usize) -> Result<()> {
    let mut expected = 0usize;
    for chunk in chunks {
        if chunk.body_start() != expected || chunk.end <= chunk.body_start() {
            return Err(ChunkerError::InvalidBoundaries {
                start: chunk.start,
                end: chunk.end,
            });
        }
        expected = chunk.end;
    }
    if expected != len {
        return Err(ChunkerError::InvalidBoundaries {
            start: expected,
            end: len,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Layer, UnitKind};
    use pretty_assertions::assert_eq;

    fn chunker(max: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkerConfig::new(max, overlap)).unwrap()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(matches!(
            Chunker::new(ChunkerConfig::new(10, 0)),
            Err(ChunkerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_file_has_no_chunks() {
        let (_, chunks) = chunker(500, 50).chunk_str("src/empty.ts", "").unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_gap_folds_into_following_unit() {
        let text = "import a from 'a';\n\nfunction one() {\n  return a;\n}\n\nfunction two() {\n  return 2;\n}\n";
        let (_, chunks) = chunker(500, 50).chunk_str("src/lib.js", text).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].content.starts_with("import a from 'a';"));
        assert!(chunks[0].content.ends_with("return a;\n}\n"));
        assert!(chunks[1].content.starts_with("\nfunction two()"));
        assert_eq!(chunks[1].metadata.unit.as_ref().map(|u| u.name.as_str()), Some("two"));
        assert_eq!(chunks[1].metadata.imports, vec!["a"]);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[1].end_line, 9);
    }

    #[test]
    fn test_trailing_code_becomes_misc_chunk() {
        let text = "function one() {\n  return 1;\n}\nconsole.log(one());\n";
        let (_, chunks) = chunker(500, 50).chunk_str("src/main.js", text).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(!chunks[0].is_misc());
        assert!(chunks[1].is_misc());
        assert_eq!(chunks[1].content, "console.log(one());\n");
    }

    #[test]
    fn test_oversized_unit_is_split_with_overlap() {
        let body: String = (0..60).map(|i| format!("  const v{i} = {i};\n")).collect();
        let text = format!("function big() {{\n{body}}}\n");
        let (analysis, chunks) = chunker(300, 40).chunk_str("src/big.js", &text).unwrap();
        assert_eq!(analysis.units.len(), 1);
        assert!(chunks.len() > 1);

        let total = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            assert!(chunk.char_len() <= 300);
            assert_eq!(chunk.metadata.unit.as_ref().map(|u| u.kind), Some(UnitKind::Function));
            assert_eq!(chunk.metadata.part, Some(ChunkPart { index: i, total }));
            if i > 0 {
                assert!(chunk.overlap > 0 && chunk.overlap <= 40);
                assert_eq!(chunk.body_start(), chunks[i - 1].end);
                let prev = &chunks[i - 1].content;
                assert!(prev.ends_with(&text[chunk.start..chunk.body_start()]));
            }
        }
    }

    #[test]
    fn test_misc_chunk_detects_own_patterns() {
        let text = "const x = fetch('/a');\n";
        let (_, chunks) = chunker(500, 50).chunk_str("src/x.py", text).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_misc());
        assert!(chunks[0]
            .metadata
            .patterns
            .contains(&crate::types::PatternTag::Network));
        assert_eq!(chunks[0].metadata.layer, Layer::Unclassified);
    }

    #[test]
    fn test_large_gap_is_emitted_before_small_unit() {
        let comments: String = (0..20).map(|i| format!("// note {i:02}\n")).collect();
        let text = format!("{comments}function f() {{\n  return 1;\n}}\n");
        let (_, chunks) = chunker(150, 20).chunk_str("src/f.js", &text).unwrap();
        let unit_chunk = chunks.last().unwrap();
        assert_eq!(unit_chunk.content, "function f() {\n  return 1;\n}\n");
        assert_eq!(unit_chunk.overlap, 0);
        assert!(chunks[..chunks.len() - 1].iter().all(CodeChunk::is_misc));
    }

    #[test]
    fn test_coverage_check_rejects_gaps() {
        let chunk = |start: usize, end: usize| CodeChunk {
            file_path: "a".to_string(),
            index: 0,
            start,
            end,
            overlap: 0,
            start_line: 1,
            end_line: 1,
            content: String::new(),
            metadata: ChunkMetadata::with_language(Language::Other),
        };
        assert!(verify_coverage(&[chunk(0, 5), chunk(5, 9)], 9).is_ok());
        assert!(verify_coverage(&[chunk(0, 5), chunk(6, 9)], 9).is_err());
        assert!(verify_coverage(&[chunk(0, 5)], 9).is_err());
    }
}
