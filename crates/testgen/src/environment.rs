//! Environment introspection.
//!
//! Before generating tests, the generator snapshots the task environment:
//! which language runtimes exist, which tools the task implicitly forbids,
//! and what the working directory contains (with bounded previews and a
//! light structural scan of code files). The snapshot is serialized into
//! the generation prompts so tests match the machine they will run on.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Max preview lines captured per task file.
const PREVIEW_LINE_LIMIT: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProhibitedTool {
    pub name: String,
    pub reason: String,
    /// Whether the tool is actually present on this machine
    pub found: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolsInfo {
    pub available: Vec<String>,
    pub prohibited: Vec<ProhibitedTool>,
    /// Shell snippet tests can run to assert a prohibited tool was not used
    #[serde(rename = "prohibitedCheck", skip_serializing_if = "Option::is_none")]
    pub prohibited_check: Option<String>,
}

/// Variables, functions, and parameters discovered in a code file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileStructure {
    pub variables: Vec<String>,
    pub functions: Vec<String>,
    pub parameters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFile {
    pub path: String,
    pub extension: String,
    #[serde(rename = "lineCount")]
    pub line_count: usize,
    /// First lines of the file, bounded
    pub preview: String,
    #[serde(rename = "detectedType")]
    pub detected_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<FileStructure>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilesInfo {
    pub workdir: String,
    pub listing: Vec<String>,
    #[serde(rename = "taskFiles")]
    pub task_files: Vec<TaskFile>,
}

/// Snapshot of the environment a task will run in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub platform: String,
    pub languages: BTreeMap<String, LanguageInfo>,
    pub tools: ToolsInfo,
    pub files: FilesInfo,
    /// Resource notes (memory, CPU) when known
    pub resources: BTreeMap<String, String>,
    /// Relevant environment variables
    pub env: BTreeMap<String, String>,
}

impl EnvironmentInfo {
    /// Build a snapshot of `workdir` for `task_description`.
    pub fn probe(workdir: &Path, task_description: &str) -> std::io::Result<Self> {
        let mut info = Self {
            platform: std::env::consts::OS.to_string(),
            ..Default::default()
        };

        info.languages = probe_languages();
        info.tools.available = probe_tools();
        info.tools.prohibited = infer_prohibited_tools(task_description)
            .into_iter()
            .map(|(name, reason)| {
                let found = which(&name);
                ProhibitedTool {
                    name,
                    reason,
                    found,
                }
            })
            .collect();
        if !info.tools.prohibited.is_empty() {
            let names: Vec<&str> = info
                .tools
                .prohibited
                .iter()
                .map(|t| t.name.as_str())
                .collect();
            info.tools.prohibited_check = Some(format!(
                "! ps aux | grep -E '({})' | grep -v grep",
                names.join("|")
            ));
        }

        info.files = probe_files(workdir)?;
        Ok(info)
    }

    /// Compact textual rendering for the generation prompt.
    pub fn render_for_prompt(&self) -> String {
        let mut out = format!("Platform: {}\n", self.platform);
        if !self.languages.is_empty() {
            let langs: Vec<String> = self
                .languages
                .iter()
                .map(|(name, l)| format!("{name} {}", l.version))
                .collect();
            out.push_str(&format!("Languages: {}\n", langs.join(", ")));
        }
        if !self.tools.prohibited.is_empty() {
            let names: Vec<String> = self
                .tools
                .prohibited
                .iter()
                .map(|t| format!("{} ({})", t.name, t.reason))
                .collect();
            out.push_str(&format!("Prohibited tools: {}\n", names.join("; ")));
        }
        if !self.files.task_files.is_empty() {
            out.push_str("Task files:\n");
            for file in &self.files.task_files {
                out.push_str(&format!(
                    "  {} [{}] {} lines\n",
                    file.path, file.detected_type, file.line_count
                ));
                if let Some(structure) = &file.structure {
                    if !structure.functions.is_empty() {
                        out.push_str(&format!(
                            "    functions: {}\n",
                            structure.functions.join(", ")
                        ));
                    }
                    if !structure.parameters.is_empty() {
                        out.push_str(&format!(
                            "    parameters: {}\n",
                            structure.parameters.join(", ")
                        ));
                    }
                }
            }
        }
        out
    }

    /// Count of parameters discovered across task files, feeding the
    /// parameter-discovery bonus of the comprehensiveness score.
    pub fn discovered_parameter_count(&self) -> usize {
        self.files
            .task_files
            .iter()
            .filter_map(|f| f.structure.as_ref())
            .map(|s| s.parameters.len())
            .sum()
    }
}

/// Tools the task description implicitly forbids.
///
/// A task asking to *convert away* from a language forbids using that
/// language's runtime to produce answers at test time.
pub fn infer_prohibited_tools(description: &str) -> Vec<(String, String)> {
    let lower = description.to_lowercase();
    let mut out = Vec::new();

    let conversions: [(&str, &[&str]); 4] = [
        ("convert r to", &["R", "Rscript"]),
        ("convert python to", &["python", "python3"]),
        ("convert ruby to", &["ruby"]),
        ("convert perl to", &["perl"]),
    ];
    for (marker, tools) in conversions {
        if lower.contains(marker) {
            for tool in tools {
                out.push((
                    tool.to_string(),
                    format!("task converts away from {tool}; using it would bypass the port"),
                ));
            }
        }
    }

    if lower.contains("without using") {
        // "without using pandas", "without using sed" and similar.
        if let Some(rest) = lower.split("without using").nth(1) {
            let candidate: String = rest
                .trim_start()
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
                .collect();
            if !candidate.is_empty() {
                out.push((candidate.clone(), "explicitly forbidden by the task".to_string()));
            }
        }
    }

    out
}

fn which(tool: &str) -> bool {
    Command::new("which")
        .arg(tool)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn version_of(program: &str, flag: &str) -> Option<String> {
    let output = Command::new(program).arg(flag).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).into_owned()
    } else {
        String::from_utf8_lossy(&output.stdout).into_owned()
    };
    Some(text.lines().next().unwrap_or_default().trim().to_string())
}

fn probe_languages() -> BTreeMap<String, LanguageInfo> {
    let candidates = [
        ("python", "python3", "--version"),
        ("node", "node", "--version"),
        ("rust", "rustc", "--version"),
        ("go", "go", "version"),
        ("r", "Rscript", "--version"),
        ("ruby", "ruby", "--version"),
        ("java", "java", "-version"),
    ];
    let mut out = BTreeMap::new();
    for (name, program, flag) in candidates {
        if let Some(version) = version_of(program, flag) {
            out.insert(
                name.to_string(),
                LanguageInfo {
                    version,
                    packages: None,
                },
            );
        }
    }
    out
}

fn probe_tools() -> Vec<String> {
    ["bash", "grep", "sed", "awk", "curl", "git", "docker", "jq"]
        .iter()
        .filter(|t| which(t))
        .map(|t| t.to_string())
        .collect()
}

fn probe_files(workdir: &Path) -> std::io::Result<FilesInfo> {
    let mut info = FilesInfo {
        workdir: workdir.display().to_string(),
        ..Default::default()
    };

    let entries = match std::fs::read_dir(workdir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(info),
        Err(e) => return Err(e),
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        info.listing.push(name.clone());

        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !is_task_file(&extension) {
            continue;
        }

        let Ok(contents) = std::fs::read_to_string(&path) else {
            continue;
        };
        let line_count = contents.lines().count();
        let preview: String = contents
            .lines()
            .take(PREVIEW_LINE_LIMIT)
            .collect::<Vec<&str>>()
            .join("\n");
        let detected_type = detect_type(&extension, &contents);
        let structure = scan_structure(&extension, &contents);

        debug!(path = %path.display(), %detected_type, "captured task file");
        info.task_files.push(TaskFile {
            path: name,
            extension,
            line_count,
            preview,
            detected_type,
            structure,
        });
    }

    info.listing.sort();
    info.task_files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(info)
}

fn is_task_file(extension: &str) -> bool {
    matches!(
        extension,
        "py" | "r" | "R" | "rb" | "js" | "ts" | "sh" | "txt" | "md" | "csv" | "json" | "yaml"
            | "yml" | "go" | "rs" | "java"
    )
}

fn detect_type(extension: &str, contents: &str) -> String {
    match extension {
        "py" => "python",
        "r" | "R" => "r",
        "rb" => "ruby",
        "js" | "ts" => "javascript",
        "sh" => "shell",
        "csv" => "data",
        "json" | "yaml" | "yml" => "config",
        "md" | "txt" => {
            if contents.lines().count() > 0 && contents.contains("# ") {
                "docs"
            } else {
                "text"
            }
        }
        _ => "code",
    }
    .to_string()
}

/// Light structural scan: definitions and their parameters. Python and R
/// cover the tasks this harness sees; other languages get no structure.
fn scan_structure(extension: &str, contents: &str) -> Option<FileStructure> {
    let (fn_re, var_re) = match extension {
        "py" => (
            Regex::new(r"(?m)^\s*def\s+(\w+)\s*\(([^)]*)\)").ok()?,
            Regex::new(r"(?m)^(\w+)\s*=").ok()?,
        ),
        "r" | "R" => (
            Regex::new(r"(?m)^\s*(\w+)\s*(?:<-|=)\s*function\s*\(([^)]*)\)").ok()?,
            Regex::new(r"(?m)^(\w+)\s*<-").ok()?,
        ),
        _ => return None,
    };

    let mut structure = FileStructure::default();
    for caps in fn_re.captures_iter(contents) {
        structure.functions.push(caps[1].to_string());
        for param in caps[2].split(',') {
            let param = param
                .split(['=', ':'])
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
            if !param.is_empty() && param != "self" {
                structure.parameters.push(param);
            }
        }
    }
    for caps in var_re.captures_iter(contents) {
        let name = caps[1].to_string();
        if !structure.functions.contains(&name) {
            structure.variables.push(name);
        }
    }

    Some(structure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_prohibited_inference_for_conversion_tasks() {
        let prohibited = infer_prohibited_tools(
            "Convert R to Python. The script in /app/analysis.R must be ported.",
        );
        let names: Vec<&str> = prohibited.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"R"));
        assert!(names.contains(&"Rscript"));
    }

    #[test]
    fn test_prohibited_inference_for_without_using() {
        let prohibited = infer_prohibited_tools("Count the words without using wc.");
        assert_eq!(prohibited[0].0, "wc");
    }

    #[test]
    fn test_no_prohibitions_for_plain_tasks() {
        assert!(infer_prohibited_tools("Write a regex matching dates").is_empty());
    }

    #[test]
    fn test_probe_files_captures_structure() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("solution.py"),
            "THRESHOLD = 5\n\ndef process(data, limit=10):\n    return data[:limit]\n",
        )
        .unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "# Notes\nremember the edge cases\n").unwrap();

        let files = probe_files(tmp.path()).unwrap();
        assert_eq!(files.task_files.len(), 2);

        let py = files
            .task_files
            .iter()
            .find(|f| f.path == "solution.py")
            .unwrap();
        assert_eq!(py.detected_type, "python");
        let structure = py.structure.as_ref().unwrap();
        assert_eq!(structure.functions, vec!["process"]);
        assert_eq!(structure.parameters, vec!["data", "limit"]);
        assert_eq!(structure.variables, vec!["THRESHOLD"]);
    }

    #[test]
    fn test_preview_bounded_to_fifty_lines() {
        let tmp = TempDir::new().unwrap();
        let big: String = (0..200).map(|i| format!("line {i}\n")).collect();
        std::fs::write(tmp.path().join("big.txt"), &big).unwrap();

        let files = probe_files(tmp.path()).unwrap();
        let file = &files.task_files[0];
        assert_eq!(file.line_count, 200);
        assert_eq!(file.preview.lines().count(), 50);
    }

    #[test]
    fn test_probe_missing_dir_is_empty() {
        let files = probe_files(Path::new("/definitely/not/here")).unwrap();
        assert!(files.listing.is_empty());
    }

    #[test]
    fn test_r_structure_scan() {
        let structure = scan_structure(
            "R",
            "threshold <- 3\nprocess <- function(df, na_rm = TRUE) {\n  df\n}\n",
        )
        .unwrap();
        assert_eq!(structure.functions, vec!["process"]);
        assert_eq!(structure.parameters, vec!["df", "na_rm"]);
        assert!(structure.variables.contains(&"threshold".to_string()));
    }
}
