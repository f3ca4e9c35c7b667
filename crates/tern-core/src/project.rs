//! Static inspection of the working directory.
//!
//! Produces language, framework and tooling hints for the system prompt. The
//! analysis never fails: anything it cannot determine stays `None` and is
//! shown as "unknown".

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::tools::search::is_excluded_dir_name;

const UNKNOWN: &str = "unknown";

/// How deep the extension-count fallback looks.
const SCAN_DEPTH: usize = 3;

/// Upper bound on files examined by the fallback.
const SCAN_FILE_LIMIT: usize = 2000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub root: PathBuf,
    pub language: Option<String>,
    pub framework: Option<String>,
    pub test_framework: Option<String>,
    pub linter: Option<String>,
    pub entry_files: Vec<String>,
    pub has_version_control: bool,
}

/// What a manifest tells us.
#[derive(Default)]
struct Findings {
    language: Option<&'static str>,
    framework: Option<&'static str>,
    test_framework: Option<&'static str>,
    linter: Option<&'static str>,
}

impl ProjectContext {
    /// Inspect `root`.
    pub fn analyze(root: &Path) -> Self {
        let findings = detect_from_manifests(root);
        let language = findings
            .language
            .map(str::to_string)
            .or_else(|| language_by_extension(root));

        let context = Self {
            root: root.to_path_buf(),
            language,
            framework: findings.framework.map(str::to_string),
            test_framework: findings.test_framework.map(str::to_string),
            linter: findings.linter.map(str::to_string),
            entry_files: entry_files(root),
            has_version_control: [".git", ".hg", ".svn", ".jj"]
                .iter()
                .any(|d| root.join(d).exists()),
        };
        debug!("Project context: {:?}", context);
        context
    }

    pub fn language_or_unknown(&self) -> &str {
        self.language.as_deref().unwrap_or(UNKNOWN)
    }
}

impl fmt::Display for ProjectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| UNKNOWN.to_string());
        writeln!(f, "Directory: {}", self.root.display())?;
        writeln!(f, "Language: {}", show(&self.language))?;
        writeln!(f, "Framework: {}", show(&self.framework))?;
        writeln!(f, "Test framework: {}", show(&self.test_framework))?;
        writeln!(f, "Linter: {}", show(&self.linter))?;
        if self.entry_files.is_empty() {
            writeln!(f, "Entry files: {}", UNKNOWN)?;
        } else {
            writeln!(f, "Entry files: {}", self.entry_files.join(", "))?;
        }
        write!(
            f,
            "Version control: {}",
            if self.has_version_control { "yes" } else { "no" }
        )
    }
}

fn read_lower(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok().map(|s| s.to_lowercase())
}

/// First `(needle, label)` whose needle occurs in `haystack`.
fn first_mentioned(haystack: &str, candidates: &[(&str, &'static str)]) -> Option<&'static str> {
    candidates
        .iter()
        .find(|(needle, _)| haystack.contains(needle))
        .map(|(_, label)| *label)
}

fn detect_from_manifests(root: &Path) -> Findings {
    if let Some(cargo) = read_lower(&root.join("Cargo.toml")) {
        return Findings {
            language: Some("Rust"),
            framework: first_mentioned(
                &cargo,
                &[
                    ("axum", "axum"),
                    ("actix-web", "actix-web"),
                    ("rocket", "Rocket"),
                    ("tauri", "Tauri"),
                    ("bevy", "Bevy"),
                    ("leptos", "Leptos"),
                    ("clap", "clap (CLI)"),
                    ("tokio", "tokio"),
                ],
            ),
            test_framework: Some("cargo test"),
            linter: Some("clippy"),
        };
    }

    if let Ok(package) = std::fs::read_to_string(root.join("package.json")) {
        return detect_node(root, &package);
    }

    let python_manifests = ["pyproject.toml", "requirements.txt", "setup.py", "setup.cfg", "Pipfile"];
    if python_manifests.iter().any(|m| root.join(m).exists()) {
        let text: String = python_manifests
            .iter()
            .filter_map(|m| read_lower(&root.join(m)))
            .collect::<Vec<_>>()
            .join("\n");
        return Findings {
            language: Some("Python"),
            framework: first_mentioned(
                &text,
                &[
                    ("django", "Django"),
                    ("fastapi", "FastAPI"),
                    ("flask", "Flask"),
                    ("streamlit", "Streamlit"),
                ],
            ),
            test_framework: first_mentioned(&text, &[("pytest", "pytest"), ("tox", "tox")])
                .or_else(|| root.join("tests").is_dir().then_some("unittest")),
            linter: first_mentioned(
                &text,
                &[("ruff", "ruff"), ("flake8", "flake8"), ("pylint", "pylint"), ("black", "black")],
            ),
        };
    }

    if let Some(gomod) = read_lower(&root.join("go.mod")) {
        return Findings {
            language: Some("Go"),
            framework: first_mentioned(
                &gomod,
                &[
                    ("gin-gonic/gin", "Gin"),
                    ("labstack/echo", "Echo"),
                    ("gofiber/fiber", "Fiber"),
                    ("spf13/cobra", "Cobra (CLI)"),
                ],
            ),
            test_framework: Some("go test"),
            linter: [".golangci.yml", ".golangci.yaml"]
                .iter()
                .any(|f| root.join(f).exists())
                .then_some("golangci-lint"),
        };
    }

    let jvm_manifest = ["pom.xml", "build.gradle", "build.gradle.kts"]
        .iter()
        .find_map(|m| read_lower(&root.join(m)).map(|text| (*m, text)));
    if let Some((manifest, text)) = jvm_manifest {
        let kotlin = manifest.ends_with(".kts") || text.contains("kotlin");
        return Findings {
            language: Some(if kotlin { "Kotlin" } else { "Java" }),
            framework: first_mentioned(
                &text,
                &[("spring-boot", "Spring Boot"), ("quarkus", "Quarkus"), ("micronaut", "Micronaut")],
            ),
            test_framework: first_mentioned(&text, &[("junit", "JUnit"), ("testng", "TestNG"), ("kotest", "Kotest")]),
            linter: first_mentioned(&text, &[("checkstyle", "Checkstyle"), ("ktlint", "ktlint"), ("detekt", "detekt")]),
        };
    }

    if let Some(gemfile) = read_lower(&root.join("Gemfile")) {
        return Findings {
            language: Some("Ruby"),
            framework: first_mentioned(&gemfile, &[("rails", "Rails"), ("sinatra", "Sinatra")]),
            test_framework: first_mentioned(&gemfile, &[("rspec", "RSpec"), ("minitest", "Minitest")]),
            linter: first_mentioned(&gemfile, &[("rubocop", "RuboCop")]),
        };
    }

    if let Some(composer) = read_lower(&root.join("composer.json")) {
        return Findings {
            language: Some("PHP"),
            framework: first_mentioned(&composer, &[("laravel", "Laravel"), ("symfony", "Symfony")]),
            test_framework: first_mentioned(&composer, &[("phpunit", "PHPUnit"), ("pest", "Pest")]),
            linter: first_mentioned(&composer, &[("phpstan", "PHPStan"), ("php-cs-fixer", "PHP-CS-Fixer")]),
        };
    }

    Findings::default()
}

fn detect_node(root: &Path, package_json: &str) -> Findings {
    let parsed: serde_json::Value = serde_json::from_str(package_json).unwrap_or_default();
    let deps: BTreeSet<String> = ["dependencies", "devDependencies", "peerDependencies"]
        .iter()
        .filter_map(|section| parsed.get(section).and_then(|s| s.as_object()))
        .flat_map(|section| section.keys().cloned())
        .collect();
    let has = |name: &str| deps.contains(name);
    let pick = |candidates: &[(&str, &'static str)]| -> Option<&'static str> {
        candidates.iter().find(|(dep, _)| has(dep)).map(|(_, label)| *label)
    };

    let typescript = has("typescript") || root.join("tsconfig.json").exists();
    Findings {
        language: Some(if typescript { "TypeScript" } else { "JavaScript" }),
        framework: pick(&[
            ("next", "Next.js"),
            ("nuxt", "Nuxt"),
            ("@sveltejs/kit", "SvelteKit"),
            ("svelte", "Svelte"),
            ("@angular/core", "Angular"),
            ("vue", "Vue"),
            ("react", "React"),
            ("@nestjs/core", "NestJS"),
            ("express", "Express"),
            ("fastify", "Fastify"),
            ("electron", "Electron"),
        ]),
        test_framework: pick(&[
            ("vitest", "Vitest"),
            ("jest", "Jest"),
            ("mocha", "Mocha"),
            ("@playwright/test", "Playwright"),
            ("cypress", "Cypress"),
        ]),
        linter: pick(&[
            ("@biomejs/biome", "Biome"),
            ("eslint", "ESLint"),
            ("prettier", "Prettier"),
        ]),
    }
}

fn language_for_extension(ext: &str) -> Option<&'static str> {
    Some(match ext {
        "rs" => "Rust",
        "py" => "Python",
        "ts" | "tsx" => "TypeScript",
        "js" | "jsx" | "mjs" | "cjs" => "JavaScript",
        "go" => "Go",
        "java" => "Java",
        "kt" | "kts" => "Kotlin",
        "rb" => "Ruby",
        "php" => "PHP",
        "c" | "h" => "C",
        "cc" | "cpp" | "cxx" | "hpp" => "C++",
        "cs" => "C#",
        "swift" => "Swift",
        "sh" | "bash" => "Shell",
        _ => return None,
    })
}

/// Most common source language among files near the root.
fn language_by_extension(root: &Path) -> Option<String> {
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    WalkDir::new(root)
        .max_depth(SCAN_DEPTH)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir()
                    && e.file_name().to_str().is_some_and(is_excluded_dir_name))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .take(SCAN_FILE_LIMIT)
        .filter_map(|e| {
            e.path()
                .extension()
                .and_then(|x| x.to_str())
                .and_then(|x| language_for_extension(&x.to_ascii_lowercase()))
        })
        .for_each(|lang| *counts.entry(lang).or_default() += 1);

    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(lang, _)| lang.to_string())
}

const ENTRY_CANDIDATES: &[&str] = &[
    "src/main.rs",
    "src/lib.rs",
    "main.py",
    "app.py",
    "manage.py",
    "src/main.py",
    "main.go",
    "index.js",
    "index.ts",
    "src/index.js",
    "src/index.ts",
    "src/main.ts",
    "src/main.tsx",
    "src/App.tsx",
    "server.js",
    "app.js",
    "src/main/java",
    "config.ru",
    "index.php",
    "Makefile",
];

fn entry_files(root: &Path) -> Vec<String> {
    let mut found: Vec<String> = ENTRY_CANDIDATES
        .iter()
        .filter(|c| root.join(c).exists())
        .map(|c| c.to_string())
        .collect();

    if let Ok(package) = std::fs::read_to_string(root.join("package.json")) {
        if let Some(main) = serde_json::from_str::<serde_json::Value>(&package)
            .ok()
            .and_then(|v| v.get("main").and_then(|m| m.as_str()).map(str::to_string))
        {
            let main = main.trim_start_matches("./").to_string();
            if !found.contains(&main) && root.join(&main).exists() {
                found.push(main);
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, path: &str, content: &str) {
        let full = root.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, content).unwrap();
    }

    #[test]
    fn test_rust_project() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Cargo.toml", "[package]\nname = \"x\"\n[dependencies]\naxum = \"0.7\"\n");
        write(dir.path(), "src/main.rs", "fn main() {}\n");
        std::fs::create_dir(dir.path().join(".git")).unwrap();

        let ctx = ProjectContext::analyze(dir.path());
        assert_eq!(ctx.language.as_deref(), Some("Rust"));
        assert_eq!(ctx.framework.as_deref(), Some("axum"));
        assert_eq!(ctx.test_framework.as_deref(), Some("cargo test"));
        assert_eq!(ctx.entry_files, vec!["src/main.rs"]);
        assert!(ctx.has_version_control);
    }

    #[test]
    fn test_typescript_react_project() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "package.json",
            r#"{"main": "./server.js", "dependencies": {"react": "18"}, "devDependencies": {"typescript": "5", "vitest": "1", "eslint": "9"}}"#,
        );
        write(dir.path(), "server.js", "");

        let ctx = ProjectContext::analyze(dir.path());
        assert_eq!(ctx.language.as_deref(), Some("TypeScript"));
        assert_eq!(ctx.framework.as_deref(), Some("React"));
        assert_eq!(ctx.test_framework.as_deref(), Some("Vitest"));
        assert_eq!(ctx.linter.as_deref(), Some("ESLint"));
        assert_eq!(ctx.entry_files, vec!["server.js"]);
        assert!(!ctx.has_version_control);
    }

    #[test]
    fn test_python_project() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "pyproject.toml", "[project]\ndependencies = [\"fastapi\"]\n[tool.ruff]\n[tool.pytest.ini_options]\n");
        let ctx = ProjectContext::analyze(dir.path());
        assert_eq!(ctx.language.as_deref(), Some("Python"));
        assert_eq!(ctx.framework.as_deref(), Some("FastAPI"));
        assert_eq!(ctx.test_framework.as_deref(), Some("pytest"));
        assert_eq!(ctx.linter.as_deref(), Some("ruff"));
    }

    #[test]
    fn test_extension_fallback_ignores_dependency_dirs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.go", "");
        write(dir.path(), "b.go", "");
        for i in 0..5 {
            write(dir.path(), &format!("node_modules/x/{}.js", i), "");
        }
        let ctx = ProjectContext::analyze(dir.path());
        assert_eq!(ctx.language.as_deref(), Some("Go"));
        assert_eq!(ctx.framework, None);
    }

    #[test]
    fn test_empty_and_missing_directories_degrade_to_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ProjectContext::analyze(dir.path());
        assert_eq!(ctx.language_or_unknown(), "unknown");
        let text = ctx.to_string();
        assert!(text.contains("Framework: unknown"));
        assert!(text.contains("Entry files: unknown"));

        let missing = ProjectContext::analyze(&dir.path().join("does-not-exist"));
        assert_eq!(missing.language, None);
    }

    #[test]
    fn test_malformed_package_json() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "package.json", "{ broken");
        let ctx = ProjectContext::analyze(dir.path());
        assert_eq!(ctx.language.as_deref(), Some("JavaScript"));
        assert_eq!(ctx.framework, None);
    }
}
