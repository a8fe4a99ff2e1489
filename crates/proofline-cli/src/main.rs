use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use crossterm::style::Stylize;
use proofline_config::Config;
use proofline_engine::{
    AnnotationCache, AnnotationSession, AnnotatorClient, CheckOutcome, Span, TextTree,
    TrackedError, extract, spawn_sweeper,
};
use serde_json::Value;
use std::{
    env,
    path::{Path, PathBuf},
    process,
};

/// Annotator that answers every check with a recorded response
struct ReplayAnnotator {
    response: Value,
}

impl ReplayAnnotator {
    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read response file {}", path.display()))?;
        let response = serde_json::from_str(&content)
            .with_context(|| format!("Response file {} is not valid JSON", path.display()))?;
        Ok(Self { response })
    }
}

#[async_trait]
impl AnnotatorClient for ReplayAnnotator {
    async fn check(&self, text: &str) -> Result<Value> {
        log::debug!("Replaying recorded response for {} chars", text.chars().count());
        Ok(self.response.clone())
    }
}

struct Args {
    text_path: PathBuf,
    response_path: Option<PathBuf>,
    html: bool,
    config_path: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut positional = Vec::new();
    let mut html = false;
    let mut config_path = None;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--html" => html = true,
            "--config" => {
                let path = iter.next().context("--config needs a path")?;
                config_path = Some(PathBuf::from(path));
            }
            flag if flag.starts_with("--") => bail!("Unknown option {flag}"),
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    let mut positional = positional.into_iter();
    let Some(text_path) = positional.next() else {
        bail!("Missing text file");
    };
    let response_path = positional.next();
    if positional.next().is_some() {
        bail!("Too many arguments");
    }

    Ok(Args {
        text_path,
        response_path,
        html,
        config_path,
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = env::args().collect();
    let parsed = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!(
                "Usage: {} <text-file> [response.json] [--html] [--config <path>]",
                args.first().map(String::as_str).unwrap_or("proofline-cli")
            );
            process::exit(1);
        }
    };

    let config_path = parsed.config_path.clone().unwrap_or_else(Config::config_path);
    log::info!("Config path: {}", config_path.display());
    let config = match Config::load_from_path(&config_path) {
        Ok(Some(config)) => config,
        Ok(None) => Config::default(),
        Err(e) => {
            eprintln!("Error: Failed to load config file: {e}");
            process::exit(1);
        }
    };

    let Some(response_path) = parsed
        .response_path
        .clone()
        .or_else(|| config.annotator.response_path.clone())
    else {
        eprintln!("Error: No response file given and none configured in [annotator]");
        process::exit(1);
    };

    let text = std::fs::read_to_string(&parsed.text_path)
        .with_context(|| format!("Failed to read {}", parsed.text_path.display()))?;
    let client = ReplayAnnotator::from_file(&response_path)?;

    let cache = AnnotationCache::shared(config.cache.clone());
    let sweeper = spawn_sweeper(&cache);
    let mut session = AnnotationSession::new(cache.clone())
        .with_config(config.session)
        .with_schedule(config.schedule)
        .with_validator(config.validation);

    let mut tree = TextTree::from_plain_text(&text);
    session.on_input(&mut tree);
    let outcome = session.check_now(&mut tree, &client).await?;

    match &outcome {
        CheckOutcome::Applied {
            report,
            repaired,
            dropped,
            ..
        } => log::info!(
            "Painted {}, skipped {}, repaired {repaired}, dropped {dropped}",
            report.painted.len(),
            report.skipped.len()
        ),
        CheckOutcome::Stale => log::warn!("Check result was stale"),
        CheckOutcome::Failed(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }

    if parsed.html {
        println!("{}", tree.to_html());
    } else {
        println!("{}", highlight(&extract(&tree).text, session.annotations()));
        println!();
        for annotation in session.annotations() {
            println!("{}", describe(annotation));
        }
    }

    let stats = session.cache_stats();
    log::info!(
        "Cache: {} entries, {} hits, {} misses",
        stats.total_entries,
        stats.hits,
        stats.misses
    );

    cache.lock().destroy();
    sweeper.await?;
    Ok(())
}

/// Flat text with every annotated range styled for the terminal
fn highlight(text: &str, annotations: &[TrackedError]) -> String {
    let mut ranges: Vec<Span> = annotations
        .iter()
        .filter(|a| a.is_paintable())
        .map(|a| a.current_range)
        .collect();
    ranges.sort();

    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for range in ranges {
        let range = range.clamp_to(chars.len());
        if range.start < cursor {
            continue;
        }
        out.extend(&chars[cursor..range.start]);
        let marked: String = chars[range.start..range.end].iter().collect();
        out.push_str(&marked.red().underlined().to_string());
        cursor = range.end;
    }
    out.extend(&chars[cursor..]);
    out
}

fn describe(annotation: &TrackedError) -> String {
    let suggestion = annotation
        .suggestions
        .first()
        .map(|s| format!(" -> {}", s.as_str().green()))
        .unwrap_or_default();
    let mut line = format!(
        "{} {}..{} {:?}{}",
        format!("[{}]", annotation.kind).bold(),
        annotation.current_range.start,
        annotation.current_range.end,
        annotation.original_substring,
        suggestion
    );
    if !annotation.explanation.is_empty() {
        line.push_str(&format!(" ({})", annotation.explanation));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use proofline_engine::AnnotationStatus;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_args_accepts_flags_anywhere() {
        let parsed = parse_args(&args(&[
            "proofline-cli",
            "--html",
            "note.txt",
            "--config",
            "/tmp/c.toml",
            "resp.json",
        ]))
        .unwrap();

        assert_eq!(parsed.text_path, PathBuf::from("note.txt"));
        assert_eq!(parsed.response_path, Some(PathBuf::from("resp.json")));
        assert_eq!(parsed.config_path, Some(PathBuf::from("/tmp/c.toml")));
        assert!(parsed.html);
    }

    #[test]
    fn parse_args_rejects_missing_and_extra_arguments() {
        assert!(parse_args(&args(&["proofline-cli"])).is_err());
        assert!(parse_args(&args(&["proofline-cli", "a", "b", "c"])).is_err());
        assert!(parse_args(&args(&["proofline-cli", "a", "--config"])).is_err());
        assert!(parse_args(&args(&["proofline-cli", "a", "--verbose"])).is_err());
    }

    #[test]
    fn highlight_keeps_unmarked_text() {
        let annotation = TrackedError {
            id: "e1".to_string(),
            kind: "spelling".to_string(),
            original_substring: "pateint".to_string(),
            suggestions: vec!["patient".to_string()],
            explanation: String::new(),
            confidence: 1.0,
            status: AnnotationStatus::Pending,
            original_range: Span::new(4, 11),
            current_range: Span::new(4, 11),
        };

        let out = highlight("The pateint has", &[annotation]);

        assert!(out.starts_with("The "));
        assert!(out.contains("pateint"));
        assert!(out.ends_with(" has"));
    }
}
