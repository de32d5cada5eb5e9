//! Compiles one module into the form stored in the bundle registry.
//!
//! The module is transpiled first, then its ES module syntax is rewritten to
//! the CommonJS-style calling convention of the bundle runtime:
//!
//! - `import` declarations become `require` calls hoisted to the top;
//! - exported bindings become live getters on `exports`;
//! - `export default <expr>` assigns `exports.default`.
//!
//! The result only depends on the module's own text, which is what makes it
//! cacheable by content fingerprint.

use super::common::{is_json, is_script, parse_error, stage_error};
use super::OxcTranspiler;
use crate::core::models::{CompiledModule, ModuleRequest, RequestKind, StageKind};
use crate::utils::{ErrorContext, KilnError, Result};
use once_cell::sync::Lazy;
use oxc_allocator::Allocator;
use oxc_ast::ast::{Declaration, ExportDefaultDeclarationKind, ImportDeclarationSpecifier, Statement};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

static REQUIRE_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\brequire\s*\(\s*(?:"([^"\n]+)"|'([^'\n]+)')\s*\)"#).expect("valid regex")
});

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("valid regex"));

/// Names the bundle runtime provides to every module body
pub const EXPORT_HELPER: &str = "__kiln_export";
pub const DEFAULT_HELPER: &str = "__kiln_default";
pub const STAR_HELPER: &str = "__kiln_star";

pub struct ModuleRewriter {
    transpiler: OxcTranspiler,
}

struct Edit {
    start: u32,
    end: u32,
    replacement: String,
}

impl Edit {
    fn remove(span: Span) -> Self {
        Self {
            start: span.start,
            end: span.end,
            replacement: String::new(),
        }
    }

    fn replace(start: u32, end: u32, replacement: impl Into<String>) -> Self {
        Self {
            start,
            end,
            replacement: replacement.into(),
        }
    }
}

/// Accumulates the rewritten pieces of a single module
#[derive(Default)]
struct Rewrite {
    edits: Vec<Edit>,
    exports: Vec<(String, String)>,
    imports_header: String,
    import_specifiers: Vec<String>,
    has_module_syntax: bool,
    bindings: usize,
}

impl Rewrite {
    fn require(&mut self, specifier: &str) -> String {
        self.import_specifiers.push(specifier.to_string());
        format!("require({})", js_string(specifier))
    }

    fn bind_require(&mut self, specifier: &str) -> String {
        let binding = format!("__kiln_m{}", self.bindings);
        self.bindings += 1;
        let call = self.require(specifier);
        self.imports_header
            .push_str(&format!("var {} = {};\n", binding, call));
        binding
    }

    fn export(&mut self, name: &str, expression: String) {
        self.exports.push((name.to_string(), expression));
    }
}

impl ModuleRewriter {
    pub fn new(transpiler: OxcTranspiler) -> Self {
        Self { transpiler }
    }

    /// Compile a module found at `path` into registry form
    pub fn compile(&self, source: &str, path: &Path) -> Result<CompiledModule> {
        if is_json(path) {
            return compile_json(source, path);
        }

        if !is_script(path) {
            return Err(stage_error(
                path,
                StageKind::Transpile,
                "unsupported module type".to_string(),
            ));
        }

        let transpiled = self.transpiler.transpile(source, path)?;
        let (code, import_specifiers) = rewrite_module_syntax(&transpiled, path)?;
        let requests = collect_requests(&code, &import_specifiers);

        Ok(CompiledModule { code, requests })
    }
}

fn compile_json(source: &str, path: &Path) -> Result<CompiledModule> {
    serde_json::from_str::<serde_json::Value>(source).map_err(|e| {
        KilnError::parse_with_context(
            format!("invalid JSON: {}", e),
            ErrorContext::new()
                .with_file(path.to_path_buf())
                .with_stage(StageKind::Transpile.to_string()),
        )
    })?;

    Ok(CompiledModule {
        code: format!("module.exports = {};\n", source.trim()),
        requests: Vec::new(),
    })
}

/// Rewrite ES module syntax in already-transpiled JavaScript. Returns the new
/// code and the specifiers that came from `import`/`export ... from`.
pub fn rewrite_module_syntax(code: &str, path: &Path) -> Result<(String, Vec<String>)> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, code, SourceType::mjs()).parse();

    if parsed.panicked || !parsed.errors.is_empty() {
        return Err(parse_error(path, StageKind::Transpile, &parsed.errors));
    }

    let mut rewrite = Rewrite::default();

    for statement in &parsed.program.body {
        match statement {
            Statement::ImportDeclaration(decl) => {
                rewrite.has_module_syntax = true;
                rewrite.edits.push(Edit::remove(decl.span));

                if decl.import_kind.is_type() {
                    continue;
                }

                let specifier = decl.source.value.as_str();
                let specifiers = match &decl.specifiers {
                    Some(specifiers) if !specifiers.is_empty() => specifiers,
                    _ => {
                        let call = rewrite.require(specifier);
                        rewrite.imports_header.push_str(&format!("{};\n", call));
                        continue;
                    }
                };

                let binding = rewrite.bind_require(specifier);
                for spec in specifiers {
                    let line = match spec {
                        ImportDeclarationSpecifier::ImportSpecifier(s) => {
                            if s.import_kind.is_type() {
                                continue;
                            }
                            format!("var {} = {};\n", s.local.name, member(&binding, s.imported.name().as_str()))
                        }
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                            format!("var {} = {}({});\n", s.local.name, DEFAULT_HELPER, binding)
                        }
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                            format!("var {} = {};\n", s.local.name, binding)
                        }
                    };
                    rewrite.imports_header.push_str(&line);
                }
            }
            Statement::ExportNamedDeclaration(decl) => {
                rewrite.has_module_syntax = true;

                if decl.export_kind.is_type() {
                    rewrite.edits.push(Edit::remove(decl.span));
                } else if let Some(source) = &decl.source {
                    let binding = rewrite.bind_require(source.value.as_str());
                    for spec in &decl.specifiers {
                        if spec.export_kind.is_type() {
                            continue;
                        }
                        let expression = member(&binding, spec.local.name().as_str());
                        rewrite.export(spec.exported.name().as_str(), expression);
                    }
                    rewrite.edits.push(Edit::remove(decl.span));
                } else if let Some(declaration) = &decl.declaration {
                    for name in declared_names(declaration, path) {
                        rewrite.export(&name, name.clone());
                    }
                    rewrite
                        .edits
                        .push(Edit::replace(decl.span.start, declaration.span().start, ""));
                } else {
                    for spec in &decl.specifiers {
                        if spec.export_kind.is_type() {
                            continue;
                        }
                        rewrite.export(spec.exported.name().as_str(), spec.local.name().to_string());
                    }
                    rewrite.edits.push(Edit::remove(decl.span));
                }
            }
            Statement::ExportDefaultDeclaration(decl) => {
                rewrite.has_module_syntax = true;
                let inner_start = decl.declaration.span().start;

                let named = match &decl.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(f) => {
                        f.id.as_ref().map(|id| id.name.to_string())
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(c) => {
                        c.id.as_ref().map(|id| id.name.to_string())
                    }
                    _ => None,
                };

                match named {
                    Some(name) => {
                        rewrite.export("default", name);
                        rewrite.edits.push(Edit::replace(decl.span.start, inner_start, ""));
                    }
                    None => {
                        rewrite
                            .edits
                            .push(Edit::replace(decl.span.start, inner_start, "exports.default = "));
                        rewrite.edits.push(Edit::replace(decl.span.end, decl.span.end, ";"));
                    }
                }
            }
            Statement::ExportAllDeclaration(decl) => {
                rewrite.has_module_syntax = true;
                rewrite.edits.push(Edit::remove(decl.span));

                if decl.export_kind.is_type() {
                    continue;
                }

                let specifier = decl.source.value.as_str();
                match &decl.exported {
                    Some(exported) => {
                        let binding = rewrite.bind_require(specifier);
                        rewrite.export(exported.name().as_str(), binding);
                    }
                    None => {
                        let call = rewrite.require(specifier);
                        rewrite
                            .imports_header
                            .push_str(&format!("{}(exports, {});\n", STAR_HELPER, call));
                    }
                }
            }
            _ => {}
        }
    }

    let body = apply_edits(code, rewrite.edits);

    let mut output = String::with_capacity(body.len() + rewrite.imports_header.len() + 128);
    if rewrite.has_module_syntax {
        output.push_str("\"use strict\";\n");
        output.push_str("Object.defineProperty(exports, \"__esModule\", { value: true });\n");
        for (name, expression) in &rewrite.exports {
            output.push_str(&format!(
                "{}(exports, {}, function () {{ return {}; }});\n",
                EXPORT_HELPER,
                js_string(name),
                expression
            ));
        }
    }
    output.push_str(&rewrite.imports_header);
    output.push_str(&body);

    Ok((output, rewrite.import_specifiers))
}

fn declared_names(declaration: &Declaration<'_>, path: &Path) -> Vec<String> {
    match declaration {
        Declaration::VariableDeclaration(var) => var
            .declarations
            .iter()
            .filter_map(|declarator| {
                let name = declarator.id.get_identifier_name().map(|n| n.to_string());
                if name.is_none() {
                    tracing::warn!(
                        "Destructured export in {} is not exported from the bundle",
                        path.display()
                    );
                }
                name
            })
            .collect(),
        Declaration::FunctionDeclaration(f) => f.id.iter().map(|id| id.name.to_string()).collect(),
        Declaration::ClassDeclaration(c) => c.id.iter().map(|id| id.name.to_string()).collect(),
        _ => Vec::new(),
    }
}

fn apply_edits(code: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|e| (e.start, e.end));

    let mut output = String::with_capacity(code.len());
    let mut cursor = 0usize;
    for edit in edits {
        let start = edit.start as usize;
        let end = edit.end as usize;
        if start < cursor || end > code.len() {
            continue;
        }
        output.push_str(&code[cursor..start]);
        output.push_str(&edit.replacement);
        cursor = end;
    }
    output.push_str(&code[cursor..]);
    output
}

/// Every `require("...")` in source order; specifiers that came from ES
/// imports are hard requirements
fn collect_requests(code: &str, import_specifiers: &[String]) -> Vec<ModuleRequest> {
    let imports: HashSet<&str> = import_specifiers.iter().map(|s| s.as_str()).collect();
    let mut seen = HashSet::new();
    let mut requests = Vec::new();

    for captures in REQUIRE_CALL.captures_iter(code) {
        let specifier = match captures.get(1).or_else(|| captures.get(2)) {
            Some(m) => m.as_str().to_string(),
            None => continue,
        };
        if !seen.insert(specifier.clone()) {
            continue;
        }
        let kind = if imports.contains(specifier.as_str()) {
            RequestKind::Import
        } else {
            RequestKind::Require
        };
        requests.push(ModuleRequest { specifier, kind });
    }

    requests
}

pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

fn member(object: &str, property: &str) -> String {
    if is_identifier(property) {
        format!("{}.{}", object, property)
    } else {
        format!("{}[{}]", object, js_string(property))
    }
}

/// A double-quoted JavaScript string literal
pub fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string())
        .to_string()
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(code: &str) -> (String, Vec<String>) {
        rewrite_module_syntax(code, Path::new("mod.js")).unwrap()
    }

    #[test]
    fn test_plain_script_is_left_alone() {
        let (code, imports) = rewrite("var a = require('./a');\nmodule.exports = a;\n");
        assert!(imports.is_empty());
        assert!(!code.contains("use strict"));
        assert!(code.contains("module.exports = a;"));
    }

    #[test]
    fn test_imports_become_hoisted_requires() {
        let (code, imports) = rewrite(
            "console.log(add(1, 2));\nimport def, { add, sub as minus } from './math';\nimport * as ns from './ns';\nimport './side-effect';\n",
        );

        assert_eq!(imports, vec!["./math", "./ns", "./side-effect"]);
        assert!(code.contains("var __kiln_m0 = require(\"./math\");"));
        assert!(code.contains("var def = __kiln_default(__kiln_m0);"));
        assert!(code.contains("var add = __kiln_m0.add;"));
        assert!(code.contains("var minus = __kiln_m0.sub;"));
        assert!(code.contains("var ns = __kiln_m1;"));
        assert!(code.contains("require(\"./side-effect\");"));
        assert!(!code.contains("import "));
        // hoisted above the first use
        assert!(code.find("__kiln_m0.add").unwrap() < code.find("console.log").unwrap());
    }

    #[test]
    fn test_exports_become_getters() {
        let (code, _) = rewrite(
            "export const a = 1, b = 2;\nexport function f() { return a; }\nexport class K {}\nconst hidden = 3;\nexport { hidden as visible };\n",
        );

        assert!(code.starts_with("\"use strict\";"));
        assert!(code.contains("__kiln_export(exports, \"a\", function () { return a; });"));
        assert!(code.contains("__kiln_export(exports, \"b\", function () { return b; });"));
        assert!(code.contains("__kiln_export(exports, \"f\", function () { return f; });"));
        assert!(code.contains("__kiln_export(exports, \"K\", function () { return K; });"));
        assert!(code.contains("__kiln_export(exports, \"visible\", function () { return hidden; });"));
        assert!(code.contains("const a = 1, b = 2;"));
        assert!(!code.contains("export "));
    }

    #[test]
    fn test_default_exports() {
        let (anonymous, _) = rewrite("export default 40 + 2;\n");
        assert!(anonymous.contains("exports.default = 40 + 2;"));

        let (named, _) = rewrite("export default function main() {}\n");
        assert!(named.contains("__kiln_export(exports, \"default\", function () { return main; });"));
        assert!(named.contains("function main() {}"));
    }

    #[test]
    fn test_reexports() {
        let (code, imports) = rewrite("export * from './all';\nexport { x as y } from './one';\nexport * as group from './group';\n");

        assert_eq!(imports, vec!["./all", "./one", "./group"]);
        assert!(code.contains("__kiln_star(exports, require(\"./all\"));"));
        assert!(code.contains("__kiln_export(exports, \"y\", function () { return __kiln_m0.x; });"));
        assert!(code.contains("__kiln_export(exports, \"group\", function () { return __kiln_m1; });"));
    }

    #[test]
    fn test_request_kinds() {
        let (code, imports) = rewrite("import a from './a';\nconst b = require('./b');\nconst again = require(\"./a\");\n");
        let requests = collect_requests(&code, &imports);

        assert_eq!(
            requests,
            vec![
                ModuleRequest { specifier: "./a".to_string(), kind: RequestKind::Import },
                ModuleRequest { specifier: "./b".to_string(), kind: RequestKind::Require },
            ]
        );
    }

    #[test]
    fn test_compile_typescript_module() {
        let rewriter = ModuleRewriter::new(OxcTranspiler::new("es2015").unwrap());
        let compiled = rewriter
            .compile(
                "import type { Shape } from './shape';\nimport { area } from './geometry';\nexport const total = (s: Shape): number => area(s);\n",
                Path::new("total.ts"),
            )
            .unwrap();

        assert!(!compiled.code.contains(": number"));
        assert!(compiled.code.contains("__kiln_export(exports, \"total\""));
        assert_eq!(
            compiled.requests,
            vec![ModuleRequest { specifier: "./geometry".to_string(), kind: RequestKind::Import }]
        );
    }

    #[test]
    fn test_compile_json_module() {
        let rewriter = ModuleRewriter::new(OxcTranspiler::new("es2015").unwrap());
        let compiled = rewriter.compile("{ \"name\": \"kiln\" }\n", Path::new("package.json")).unwrap();
        assert_eq!(compiled.code, "module.exports = { \"name\": \"kiln\" };\n");

        assert!(rewriter.compile("{ nope", Path::new("bad.json")).is_err());
        assert!(rewriter.compile("body {}", Path::new("style.css")).is_err());
    }

    #[test]
    fn test_js_string_escapes() {
        assert_eq!(js_string("a\"b"), "\"a\\\"b\"");
        assert_eq!(member("m", "default"), "m.default");
        assert_eq!(member("m", "kebab-name"), "m[\"kebab-name\"]");
    }
}
