// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Virtual loader modules for registered binaries
//!
//! The rewritten source refers to a binary through a synthetic id. When the
//! host asks to load that id, the plugin answers with a tiny module that loads
//! the copied binary from its output location.

/// Reserved prefix of synthetic ids. The leading NUL keeps real paths and
/// other resolvers from ever claiming them.
pub const PREFIX: &str = "\0natpack:";

/// Build the synthetic id for an output id.
pub fn synthetic_id(output_id: &str) -> String {
    format!("{}{}", PREFIX, output_id)
}

/// The output id carried by a synthetic id, if `id` is one.
pub fn parse_synthetic(id: &str) -> Option<&str> {
    id.strip_prefix(PREFIX)
}

/// How the generated loader reaches the binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderMode {
    /// `process.dlopen` into a cached module object
    Dlopen,
    /// `createRequire(import.meta.url)` for ES module output
    Esm,
    /// A single default export of `require`
    Cjs,
}

/// Source of the loader module for `output_id`.
pub fn render_loader(output_id: &str, mode: LoaderMode) -> String {
    let id = json_string(output_id);
    match mode {
        LoaderMode::Dlopen => format!(
            r#"
function load_module() {{
  let p = require("path").resolve(__dirname, {id});
  if (!require.cache[p]) {{
    let module = {{ exports: {{}} }};
    process.dlopen(module, p);
    require.cache[p] = module;
  }}
  // aliased so other plugins leave this require alone
  let req = require || require;
  return req(p);
}};
export default load_module();
"#
        ),
        LoaderMode::Esm => format!(
            r#"
import {{ createRequire }} from "node:module";
const require = createRequire(import.meta.url);
export default require({id});
"#
        ),
        LoaderMode::Cjs => format!("export default require({id});\n"),
    }
}

/// Loader for hosts that write CommonJS modules without bundling them.
///
/// `path` is relative to the loader file itself, so the loader can live
/// anywhere as long as the binary is copied to the matching place.
pub fn render_commonjs_loader(path: &str, mode: LoaderMode) -> String {
    let id = json_string(path);
    match mode {
        LoaderMode::Dlopen => format!(
            "const p = require(\"path\").resolve(__dirname, {id});\n\
             const m = {{ exports: {{}} }};\n\
             process.dlopen(m, p);\n\
             module.exports = m.exports;\n"
        ),
        LoaderMode::Esm | LoaderMode::Cjs => format!("module.exports = require({id});\n"),
    }
}

/// Quote a string as a JavaScript string literal.
pub(crate) fn json_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_round_trip() {
        let id = synthetic_id("./better_sqlite3.node");
        assert!(id.starts_with('\0'));
        assert_eq!(parse_synthetic(&id), Some("./better_sqlite3.node"));
        assert_eq!(parse_synthetic("./better_sqlite3.node"), None);
    }

    #[test]
    fn test_cjs_loader() {
        assert_eq!(
            render_loader("./addon.node", LoaderMode::Cjs),
            "export default require(\"./addon.node\");\n"
        );
    }

    #[test]
    fn test_esm_loader_creates_require() {
        let src = render_loader("./addon.node", LoaderMode::Esm);
        assert!(src.contains("createRequire(import.meta.url)"));
        assert!(src.contains("export default require(\"./addon.node\");"));
    }

    #[test]
    fn test_commonjs_loader() {
        assert_eq!(
            render_commonjs_loader("../native/addon.node", LoaderMode::Cjs),
            "module.exports = require(\"../native/addon.node\");\n"
        );
        let src = render_commonjs_loader("../native/addon.dll", LoaderMode::Dlopen);
        assert!(src.starts_with("const p = require(\"path\").resolve(__dirname, \"../native/addon.dll\");"));
        assert!(src.ends_with("module.exports = m.exports;\n"));
    }

    #[test]
    fn test_dlopen_loader_uses_output_location() {
        let src = render_loader("./native/addon.dll", LoaderMode::Dlopen);
        assert!(src.contains("resolve(__dirname, \"./native/addon.dll\")"));
        assert!(src.contains("process.dlopen(module, p)"));
        assert!(src.contains("require.cache[p] = module"));
        assert!(src.trim_end().ends_with("export default load_module();"));
    }
}
