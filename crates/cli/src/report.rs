use cortex_vectorizer::{Stage, VectorizerOutput};
use std::path::Path;

const TOP_FEATURES: usize = 10;
const MAX_LISTED_ERRORS: usize = 50;

pub fn render_summary(project_root: &Path, knowledge_base: &Path, out: &VectorizerOutput) -> String {
    let stats = &out.stats;

    let mut md = String::new();
    md.push_str("# Cortex knowledge base summary\n\n");
    md.push_str(&format!("- Project: `{}`\n", project_root.display()));
    md.push_str(&format!("- Knowledge base: `{}`\n", knowledge_base.display()));
    md.push_str(&format!(
        "- Provider: `{}` (model `{}`, dimension {})\n",
        out.provider, out.model, out.dimension
    ));
    md.push_str(&format!(
        "- Files: `{}` seen, `{}` succeeded, `{}` failed\n",
        stats.files_seen, stats.files_succeeded, stats.files_failed
    ));
    md.push_str(&format!(
        "- Chunks: `{}` produced, `{}` embedded\n",
        stats.chunks_produced, stats.chunks_embedded
    ));
    md.push_str(&format!("- Lines: `{}`\n", stats.total_lines));
    if stats.provider_attempts > 0 {
        md.push_str(&format!(
            "- Provider requests: `{}`\n",
            stats.provider_attempts
        ));
    }
    md.push_str(&format!(
        "- Elapsed: `{:.2}s`\n\n",
        stats.elapsed_ms as f64 / 1000.0
    ));

    md.push_str("## Layers\n\n");
    count_table(
        &mut md,
        "layer",
        stats.layers.iter().map(|(layer, n)| (layer.as_str().to_string(), *n)),
        stats.chunks_embedded,
    );

    md.push_str(&format!("## Top features (max {TOP_FEATURES})\n\n"));
    let mut features: Vec<_> = stats.features.iter().collect();
    features.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    count_table(
        &mut md,
        "feature",
        features
            .into_iter()
            .take(TOP_FEATURES)
            .map(|(feature, n)| (feature.clone(), *n)),
        stats.chunks_embedded,
    );

    md.push_str("## Patterns\n\n");
    count_table(
        &mut md,
        "pattern",
        stats
            .patterns
            .iter()
            .map(|(pattern, n)| (pattern.as_str().to_string(), *n)),
        stats.chunks_embedded,
    );

    md.push_str("## Complexity\n\n");
    count_table(
        &mut md,
        "tier",
        stats
            .complexity
            .iter()
            .map(|(tier, n)| (tier.as_str().to_string(), *n)),
        stats.chunks_embedded,
    );

    md.push_str("## Languages\n\n");
    count_table(
        &mut md,
        "language",
        stats.languages.iter().map(|(lang, n)| (lang.clone(), *n)),
        stats.chunks_embedded,
    );

    md.push_str("## Errors\n\n");
    if out.errors.is_empty() {
        md.push_str("No errors.\n");
        return md;
    }
    md.push_str("| stage | count |\n");
    md.push_str("|---|---:|\n");
    for stage in Stage::ALL {
        let count = stats.errors_by_stage.get(&stage).copied().unwrap_or(0);
        if count > 0 {
            md.push_str(&format!("| `{}` | `{}` |\n", stage.as_str(), count));
        }
    }
    md.push('\n');

    for error in out.errors.iter().take(MAX_LISTED_ERRORS) {
        let chunks = if error.chunks.is_empty() {
            String::new()
        } else {
            format!(" (chunks {})", join_indices(&error.chunks))
        };
        md.push_str(&format!(
            "- `{}` [{}]{}: {}\n",
            error.file,
            error.stage.as_str(),
            chunks,
            truncate_one_line(&error.message, 200)
        ));
    }
    if out.errors.len() > MAX_LISTED_ERRORS {
        md.push_str(&format!(
            "- ... {} more\n",
            out.errors.len() - MAX_LISTED_ERRORS
        ));
    }

    md
}

fn count_table(
    md: &mut String,
    label: &str,
    rows: impl Iterator<Item = (String, usize)>,
    total: usize,
) {
    let rows: Vec<(String, usize)> = rows.collect();
    if rows.is_empty() {
        md.push_str("_none_\n\n");
        return;
    }
    md.push_str(&format!("| {label} | chunks | share |\n"));
    md.push_str("|---|---:|---:|\n");
    for (name, count) in rows {
        let share = if total == 0 {
            0.0
        } else {
            count as f64 * 100.0 / total as f64
        };
        md.push_str(&format!(
            "| `{}` | `{}` | `{:.1}%` |\n",
            escape_cell(&name),
            count,
            share
        ));
    }
    md.push('\n');
}

fn join_indices(indices: &[usize]) -> String {
    indices
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn truncate_one_line(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    if line.chars().count() <= max_chars {
        return line.to_string();
    }
    let mut out: String = line.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_code_chunker::Layer;
    use cortex_vectorizer::{ProcessingError, RunStats};

    fn output() -> VectorizerOutput {
        let mut stats = RunStats {
            files_seen: 3,
            files_succeeded: 2,
            files_failed: 1,
            chunks_produced: 5,
            chunks_embedded: 4,
            ..RunStats::default()
        };
        stats.layers.insert(Layer::Presentation, 3);
        stats.layers.insert(Layer::DataAccess, 1);
        for i in 0..12 {
            stats.features.insert(format!("feature{i:02}"), i + 1);
        }
        stats.errors_by_stage.insert(Stage::Read, 1);

        VectorizerOutput {
            provider: "local-stub:all-minilm-l6-v2".to_string(),
            model: "all-minilm-l6-v2".to_string(),
            dimension: 384,
            records: Vec::new(),
            errors: vec![ProcessingError {
                file: "bin/blob.js".to_string(),
                stage: Stage::Read,
                message: "file looks binary\nsecond line".to_string(),
                chunks: Vec::new(),
            }],
            files: Vec::new(),
            stats,
        }
    }

    #[test]
    fn test_summary_lists_counts_and_errors() {
        let md = render_summary(Path::new("/work/app"), Path::new("kb.json"), &output());

        assert!(md.contains("- Files: `3` seen, `2` succeeded, `1` failed"));
        assert!(md.contains("| `presentation` | `3` | `75.0%` |"));
        assert!(md.contains("| `data-access` | `1` | `25.0%` |"));
        assert!(md.contains("| `read` | `1` |"));
        assert!(md.contains("- `bin/blob.js` [read]: file looks binary\n"));
        assert!(!md.contains("second line"));
    }

    #[test]
    fn test_features_are_capped_and_sorted_by_count() {
        let md = render_summary(Path::new("."), Path::new("kb.json"), &output());

        assert!(md.contains("`feature11`"));
        assert!(md.contains("`feature02`"));
        assert!(!md.contains("`feature01`"));
        assert!(!md.contains("`feature00`"));
        let top = md.find("`feature11`").unwrap();
        let next = md.find("`feature10`").unwrap();
        assert!(top < next);
    }

    #[test]
    fn test_empty_run_has_placeholders() {
        let out = VectorizerOutput {
            errors: Vec::new(),
            stats: RunStats::default(),
            ..output()
        };
        let md = render_summary(Path::new("."), Path::new("kb.json"), &out);

        assert!(md.contains("## Patterns\n\n_none_"));
        assert!(md.ends_with("No errors.\n"));
    }
}
