//! Language chunker registry
//!
//! Maps file extensions to chunker strategy descriptors: language name,
//! chunk-size profile, and the regex pattern lists that recognize
//! function starts, class starts, and imports. All language-specific
//! behavior lives in this one table plus the generic chunking engine;
//! extensions not present fall back to the `generic` descriptor.
//!
//! The registry is static. It is built once on first use and never
//! mutated at runtime.

use crate::types::FileType;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Token bounds for a chunk-size profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeProfile {
    pub min_tokens: u32,
    pub max_tokens: u32,
}

impl SizeProfile {
    pub const CODE: Self = Self { min_tokens: 256, max_tokens: 1024 };
    pub const DOCS: Self = Self { min_tokens: 256, max_tokens: 1024 };
    pub const CONFIG_DATA: Self = Self { min_tokens: 128, max_tokens: 512 };
    pub const GENERIC: Self = Self { min_tokens: 256, max_tokens: 1024 };

    /// Scale bounds by the content complexity factor.
    ///
    /// Complexity above 0.5 shrinks chunks (denser content, tighter
    /// units); results are clamped to [128, 2048].
    pub fn scaled(&self, complexity: f32) -> Self {
        if complexity <= 0.5 {
            return *self;
        }
        let scale = 1.0 / complexity;
        Self {
            min_tokens: ((self.min_tokens as f32 * scale) as u32).clamp(128, 2048),
            max_tokens: ((self.max_tokens as f32 * scale) as u32).clamp(128, 2048),
        }
    }
}

/// A chunker strategy descriptor for one language
pub struct LanguageSpec {
    /// Language name ("python", "markdown", ...)
    pub language: &'static str,
    /// Broad file classification
    pub file_type: FileType,
    /// Token bounds before complexity scaling
    pub profile: SizeProfile,
    /// Patterns whose first capture group is the function name
    pub function_patterns: Vec<Regex>,
    /// Patterns whose first capture group is the class/type name
    pub class_patterns: Vec<Regex>,
    /// Patterns matching import/include lines (no capture required)
    pub import_patterns: Vec<Regex>,
}

impl LanguageSpec {
    /// Match a line against the function patterns, returning the name
    pub fn match_function(&self, line: &str) -> Option<String> {
        first_capture(&self.function_patterns, line)
    }

    /// Match a line against the class patterns, returning the name
    pub fn match_class(&self, line: &str) -> Option<String> {
        first_capture(&self.class_patterns, line)
    }

    /// Whether the line is an import/include statement
    pub fn match_import(&self, line: &str) -> bool {
        self.import_patterns.iter().any(|re| re.is_match(line))
    }
}

fn first_capture(patterns: &[Regex], line: &str) -> Option<String> {
    for re in patterns {
        if let Some(caps) = re.captures(line) {
            if let Some(name) = caps.get(1) {
                return Some(name.as_str().to_owned());
            }
        }
    }
    None
}

/// Raw table row, compiled into a [`LanguageSpec`] at registry build
struct RawSpec {
    language: &'static str,
    extensions: &'static [&'static str],
    file_type: FileType,
    profile: SizeProfile,
    functions: &'static [&'static str],
    classes: &'static [&'static str],
    imports: &'static [&'static str],
}

/// The pattern table. One row per language; patterns were consolidated
/// from per-language chunker definitions into capture-group form.
const TABLE: &[RawSpec] = &[
    RawSpec {
        language: "python",
        extensions: &["py", "pyw", "pyi"],
        file_type: FileType::Code,
        profile: SizeProfile::CODE,
        functions: &[r"^\s*def\s+(\w+)\s*\(", r"^\s*async\s+def\s+(\w+)\s*\("],
        classes: &[r"^\s*class\s+(\w+)"],
        imports: &[r"^\s*import\s+", r"^\s*from\s+\S+\s+import\b"],
    },
    RawSpec {
        language: "javascript",
        extensions: &["js", "jsx", "mjs", "cjs"],
        file_type: FileType::Code,
        profile: SizeProfile::CODE,
        functions: &[
            r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(\w+)\s*\(",
            r"^\s*(?:const|let|var)\s+(\w+)\s*=\s*(?:async\s+)?\([^)]*\)\s*=>",
            r"^\s*(?:const|let|var)\s+(\w+)\s*=\s*(?:async\s+)?function\b",
        ],
        classes: &[
            r"^\s*(?:export\s+)?(?:default\s+)?class\s+(\w+)",
            r"^\s*(?:const|let|var)\s+(\w+)\s*=\s*class\b",
        ],
        imports: &[r"^\s*import\s+", r"^\s*(?:const|let|var)\s+.*=\s*require\s*\(", r"^\s*export\s+\{"],
    },
    RawSpec {
        language: "typescript",
        extensions: &["ts", "tsx", "mts", "cts"],
        file_type: FileType::Code,
        profile: SizeProfile::CODE,
        functions: &[
            r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(\w+)\s*[(<]",
            r"^\s*(?:export\s+)?(?:const|let|var)\s+(\w+)\s*=\s*(?:async\s+)?\([^)]*\)(?:\s*:\s*[^=]+)?\s*=>",
        ],
        classes: &[
            r"^\s*(?:export\s+)?(?:abstract\s+)?class\s+(\w+)",
            r"^\s*(?:export\s+)?interface\s+(\w+)",
            r"^\s*(?:export\s+)?type\s+(\w+)\s*=",
            r"^\s*(?:export\s+)?enum\s+(\w+)",
        ],
        imports: &[r"^\s*import\s+", r"^\s*export\s+\{"],
    },
    RawSpec {
        language: "rust",
        extensions: &["rs"],
        file_type: FileType::Code,
        profile: SizeProfile::CODE,
        functions: &[r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+(\w+)"],
        classes: &[
            r"^\s*(?:pub(?:\([^)]*\))?\s+)?struct\s+(\w+)",
            r"^\s*(?:pub(?:\([^)]*\))?\s+)?enum\s+(\w+)",
            r"^\s*(?:pub(?:\([^)]*\))?\s+)?trait\s+(\w+)",
            r"^\s*impl(?:<[^>]*>)?\s+(?:\w+\s+for\s+)?(\w+)",
        ],
        imports: &[r"^\s*use\s+", r"^\s*extern\s+crate\s+"],
    },
    RawSpec {
        language: "go",
        extensions: &["go"],
        file_type: FileType::Code,
        profile: SizeProfile::CODE,
        functions: &[r"^\s*func\s+(?:\([^)]*\)\s*)?(\w+)\s*\("],
        classes: &[r"^\s*type\s+(\w+)\s+(?:struct|interface)\b"],
        imports: &[r"^\s*import\s+", r"^\s*package\s+"],
    },
    RawSpec {
        language: "java",
        extensions: &["java"],
        file_type: FileType::Code,
        profile: SizeProfile::CODE,
        functions: &[
            r"^\s*(?:public|private|protected)?\s*(?:static\s+)?(?:final\s+)?[\w<>\[\].]+\s+(\w+)\s*\([^)]*\)\s*(?:throws\b[^{]*)?\{",
        ],
        classes: &[
            r"^\s*(?:public|private|protected)?\s*(?:abstract\s+|final\s+)?class\s+(\w+)",
            r"^\s*(?:public|private|protected)?\s*interface\s+(\w+)",
            r"^\s*(?:public|private|protected)?\s*enum\s+(\w+)",
        ],
        imports: &[r"^\s*import\s+", r"^\s*package\s+"],
    },
    RawSpec {
        language: "c",
        extensions: &["c", "h"],
        file_type: FileType::Code,
        profile: SizeProfile::CODE,
        functions: &[r"^[\w*]+[\w\s*]*\b(\w+)\s*\([^;]*\)\s*\{?\s*$"],
        classes: &[r"^\s*(?:typedef\s+)?struct\s+(\w+)"],
        imports: &[r"^\s*#include\s"],
    },
    RawSpec {
        language: "cpp",
        extensions: &["cpp", "cc", "cxx", "hpp", "hh"],
        file_type: FileType::Code,
        profile: SizeProfile::CODE,
        functions: &[r"^[\w:<>~]+[\w\s:<>*&~]*\b([\w~]+)\s*\([^;]*\)\s*(?:const\s*)?\{?\s*$"],
        classes: &[r"^\s*class\s+(\w+)", r"^\s*(?:typedef\s+)?struct\s+(\w+)"],
        imports: &[r"^\s*#include\s", r"^\s*using\s+namespace\s"],
    },
    RawSpec {
        language: "csharp",
        extensions: &["cs"],
        file_type: FileType::Code,
        profile: SizeProfile::CODE,
        functions: &[
            r"^\s*(?:public|private|protected|internal)\s+(?:static\s+)?(?:async\s+)?[\w<>\[\].?]+\s+(\w+)\s*\(",
        ],
        classes: &[
            r"^\s*(?:public|private|protected|internal)?\s*(?:abstract\s+|sealed\s+|static\s+)?class\s+(\w+)",
            r"^\s*(?:public|private|protected|internal)?\s*interface\s+(\w+)",
        ],
        imports: &[r"^\s*using\s+", r"^\s*namespace\s+"],
    },
    RawSpec {
        language: "ruby",
        extensions: &["rb", "rake"],
        file_type: FileType::Code,
        profile: SizeProfile::CODE,
        functions: &[r"^\s*def\s+(?:self\.)?(\w+[?!]?)"],
        classes: &[r"^\s*class\s+(\w+)", r"^\s*module\s+(\w+)"],
        imports: &[r"^\s*require(?:_relative)?\s+"],
    },
    RawSpec {
        language: "php",
        extensions: &["php"],
        file_type: FileType::Code,
        profile: SizeProfile::CODE,
        functions: &[r"^\s*(?:public|private|protected)?\s*(?:static\s+)?function\s+(\w+)\s*\("],
        classes: &[r"^\s*(?:abstract\s+|final\s+)?class\s+(\w+)", r"^\s*interface\s+(\w+)"],
        imports: &[r"^\s*use\s+", r"^\s*(?:require|include)(?:_once)?\b"],
    },
    RawSpec {
        language: "kotlin",
        extensions: &["kt", "kts"],
        file_type: FileType::Code,
        profile: SizeProfile::CODE,
        functions: &[r"^\s*(?:override\s+)?(?:suspend\s+)?fun\s+(?:<[^>]*>\s*)?(\w+)\s*\("],
        classes: &[r"^\s*(?:data\s+|sealed\s+|abstract\s+|open\s+)?class\s+(\w+)", r"^\s*object\s+(\w+)", r"^\s*interface\s+(\w+)"],
        imports: &[r"^\s*import\s+", r"^\s*package\s+"],
    },
    RawSpec {
        language: "swift",
        extensions: &["swift"],
        file_type: FileType::Code,
        profile: SizeProfile::CODE,
        functions: &[r"^\s*(?:public\s+|private\s+|internal\s+)?(?:static\s+)?func\s+(\w+)\s*[(<]"],
        classes: &[r"^\s*(?:public\s+|private\s+|final\s+)?(?:class|struct|enum|protocol)\s+(\w+)"],
        imports: &[r"^\s*import\s+"],
    },
    RawSpec {
        language: "scala",
        extensions: &["scala"],
        file_type: FileType::Code,
        profile: SizeProfile::CODE,
        functions: &[r"^\s*(?:override\s+)?def\s+(\w+)"],
        classes: &[r"^\s*(?:case\s+)?class\s+(\w+)", r"^\s*object\s+(\w+)", r"^\s*trait\s+(\w+)"],
        imports: &[r"^\s*import\s+", r"^\s*package\s+"],
    },
    RawSpec {
        language: "shell",
        extensions: &["sh", "bash", "zsh"],
        file_type: FileType::Code,
        profile: SizeProfile::CODE,
        functions: &[r"^\s*(?:function\s+)?(\w+)\s*\(\)\s*\{", r"^\s*function\s+(\w+)\b"],
        classes: &[],
        imports: &[r"^\s*(?:source|\.)\s+"],
    },
    RawSpec {
        language: "lua",
        extensions: &["lua"],
        file_type: FileType::Code,
        profile: SizeProfile::CODE,
        functions: &[r"^\s*(?:local\s+)?function\s+([\w.:]+)\s*\("],
        classes: &[],
        imports: &[r#"^\s*(?:local\s+\w+\s*=\s*)?require\s*[("]"#],
    },
    RawSpec {
        language: "perl",
        extensions: &["pl", "pm"],
        file_type: FileType::Code,
        profile: SizeProfile::CODE,
        functions: &[r"^\s*sub\s+(\w+)"],
        classes: &[r"^\s*package\s+([\w:]+)"],
        imports: &[r"^\s*use\s+", r"^\s*require\s+"],
    },
    RawSpec {
        language: "r",
        extensions: &["r", "R"],
        file_type: FileType::Code,
        profile: SizeProfile::CODE,
        functions: &[r"^\s*(\w[\w.]*)\s*(?:<-|=)\s*function\s*\("],
        classes: &[],
        imports: &[r"^\s*library\s*\(", r"^\s*require\s*\("],
    },
    RawSpec {
        language: "sql",
        extensions: &["sql"],
        file_type: FileType::Code,
        profile: SizeProfile::CODE,
        functions: &[r"(?i)^\s*create\s+(?:or\s+replace\s+)?(?:function|procedure)\s+([\w.]+)"],
        classes: &[r"(?i)^\s*create\s+table\s+(?:if\s+not\s+exists\s+)?([\w.]+)"],
        imports: &[],
    },
    RawSpec {
        language: "markdown",
        extensions: &["md", "markdown", "mdx", "rst", "adoc", "txt"],
        file_type: FileType::Docs,
        profile: SizeProfile::DOCS,
        functions: &[],
        classes: &[],
        imports: &[],
    },
    RawSpec {
        language: "html",
        extensions: &["html", "htm", "xhtml"],
        file_type: FileType::Markup,
        profile: SizeProfile::GENERIC,
        functions: &[],
        classes: &[],
        imports: &[],
    },
    RawSpec {
        language: "xml",
        extensions: &["xml", "xsd", "xsl", "svg"],
        file_type: FileType::Markup,
        profile: SizeProfile::GENERIC,
        functions: &[],
        classes: &[],
        imports: &[],
    },
    RawSpec {
        language: "css",
        extensions: &["css", "scss", "sass", "less"],
        file_type: FileType::Code,
        profile: SizeProfile::CODE,
        functions: &[],
        classes: &[],
        imports: &[r"^\s*@import\s", r"^\s*@use\s"],
    },
    RawSpec {
        language: "json",
        extensions: &["json", "jsonl", "webmanifest"],
        file_type: FileType::Data,
        profile: SizeProfile::CONFIG_DATA,
        functions: &[],
        classes: &[],
        imports: &[],
    },
    RawSpec {
        language: "yaml",
        extensions: &["yaml", "yml"],
        file_type: FileType::Config,
        profile: SizeProfile::CONFIG_DATA,
        functions: &[],
        classes: &[],
        imports: &[],
    },
    RawSpec {
        language: "toml",
        extensions: &["toml"],
        file_type: FileType::Config,
        profile: SizeProfile::CONFIG_DATA,
        functions: &[],
        classes: &[],
        imports: &[],
    },
    RawSpec {
        language: "ini",
        extensions: &["ini", "cfg", "conf", "properties", "env"],
        file_type: FileType::Config,
        profile: SizeProfile::CONFIG_DATA,
        functions: &[],
        classes: &[],
        imports: &[],
    },
    RawSpec {
        language: "notebook",
        extensions: &["ipynb"],
        file_type: FileType::Notebook,
        profile: SizeProfile::CODE,
        functions: &[],
        classes: &[],
        imports: &[],
    },
    RawSpec {
        language: "csv",
        extensions: &["csv", "tsv"],
        file_type: FileType::Data,
        profile: SizeProfile::CONFIG_DATA,
        functions: &[],
        classes: &[],
        imports: &[],
    },
];

/// The compiled registry: extension lookup plus the generic fallback
pub struct Registry {
    specs: Vec<LanguageSpec>,
    by_extension: HashMap<&'static str, usize>,
    generic: LanguageSpec,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Get the process-wide registry
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::build)
}

impl Registry {
    fn build() -> Self {
        let mut specs = Vec::with_capacity(TABLE.len());
        let mut by_extension = HashMap::new();

        for (i, raw) in TABLE.iter().enumerate() {
            specs.push(LanguageSpec {
                language: raw.language,
                file_type: raw.file_type,
                profile: raw.profile,
                function_patterns: compile(raw.functions),
                class_patterns: compile(raw.classes),
                import_patterns: compile(raw.imports),
            });
            for ext in raw.extensions {
                by_extension.insert(*ext, i);
            }
        }

        let generic = LanguageSpec {
            language: "generic",
            file_type: FileType::Other,
            profile: SizeProfile::GENERIC,
            function_patterns: Vec::new(),
            class_patterns: Vec::new(),
            import_patterns: Vec::new(),
        };

        Self { specs, by_extension, generic }
    }

    /// Look up the spec for a file extension (without leading dot)
    pub fn for_extension(&self, ext: &str) -> &LanguageSpec {
        let lower = ext.to_lowercase();
        self.by_extension
            .get(lower.as_str())
            // `.R` files keep their case in the table
            .or_else(|| self.by_extension.get(ext))
            .map(|&i| &self.specs[i])
            .unwrap_or(&self.generic)
    }

    /// Resolve a spec for a file, falling back to shebang sniffing for
    /// extensionless scripts
    pub fn detect(&self, file_path: &str, content: &str) -> &LanguageSpec {
        let ext = file_path.rsplit('.').next().filter(|e| *e != file_path).unwrap_or("");
        if !ext.is_empty() && !ext.contains('/') {
            let spec = self.for_extension(ext);
            if spec.language != "generic" {
                return spec;
            }
        }

        if let Some(first) = content.lines().next() {
            if first.starts_with("#!") {
                if first.contains("python") {
                    return self.for_extension("py");
                }
                if ["bash", "sh", "zsh"].iter().any(|s| first.contains(s)) {
                    return self.for_extension("sh");
                }
            }
        }

        &self.generic
    }

    /// Whether the registry has a dedicated spec for this extension
    pub fn knows_extension(&self, ext: &str) -> bool {
        self.by_extension.contains_key(ext.to_lowercase().as_str())
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("language table pattern must compile"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_lookup() {
        let reg = registry();
        assert_eq!(reg.for_extension("py").language, "python");
        assert_eq!(reg.for_extension("RS").language, "rust");
        assert_eq!(reg.for_extension("xyzzy").language, "generic");
    }

    #[test]
    fn test_python_patterns() {
        let spec = registry().for_extension("py");
        assert_eq!(spec.match_function("def handler(event):"), Some("handler".to_owned()));
        assert_eq!(spec.match_function("async def run():"), Some("run".to_owned()));
        assert_eq!(spec.match_class("class Ingester:"), Some("Ingester".to_owned()));
        assert!(spec.match_import("from pathlib import Path"));
        assert!(!spec.match_import("x = 1"));
    }

    #[test]
    fn test_rust_patterns() {
        let spec = registry().for_extension("rs");
        assert_eq!(spec.match_function("pub async fn embed(&self) {"), Some("embed".to_owned()));
        assert_eq!(spec.match_class("pub struct Chunker {"), Some("Chunker".to_owned()));
        assert!(spec.match_import("use std::sync::Arc;"));
    }

    #[test]
    fn test_javascript_arrow_function() {
        let spec = registry().for_extension("js");
        assert_eq!(
            spec.match_function("const fetchData = async (url) => {"),
            Some("fetchData".to_owned())
        );
    }

    #[test]
    fn test_shebang_detection() {
        let reg = registry();
        assert_eq!(reg.detect("scripts/deploy", "#!/usr/bin/env python3\nprint(1)\n").language, "python");
        assert_eq!(reg.detect("scripts/run", "#!/bin/bash\necho hi\n").language, "shell");
        assert_eq!(reg.detect("LICENSE", "MIT License\n").language, "generic");
    }

    #[test]
    fn test_profile_scaling() {
        let profile = SizeProfile::CODE;
        // Low complexity leaves bounds untouched
        assert_eq!(profile.scaled(0.3), profile);
        // High complexity shrinks, clamped to the floor
        let scaled = profile.scaled(2.0);
        assert_eq!(scaled.min_tokens, 128);
        assert_eq!(scaled.max_tokens, 512);
    }

    #[test]
    fn test_profile_clamp_floor() {
        let profile = SizeProfile::CONFIG_DATA;
        let scaled = profile.scaled(2.0);
        assert!(scaled.min_tokens >= 128);
        assert!(scaled.max_tokens >= 128);
    }
}
