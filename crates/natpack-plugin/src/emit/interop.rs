// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! ES module shims over CommonJS native packages

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use crate::loader::json_string;

const RESERVED: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// `<out>/<package>.mjs`; scoped packages get a folder per scope.
pub fn shim_path(out: &Path, package: &str) -> PathBuf {
    out.join(format!("{}.mjs", package))
}

/// Relative specifier from `shim` to `target`, always starting with `./` or `../`.
pub fn relative_id(shim: &Path, target: &Path) -> Option<String> {
    let from = shim.parent()?;
    let rel = pathdiff::diff_paths(target, from)?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            Component::CurDir => Some(".".to_string()),
            _ => None,
        })
        .collect::<Option<_>>()?;
    let joined = parts.join("/");
    Some(if joined.starts_with("..") {
        joined
    } else {
        format!("./{}", joined)
    })
}

/// Whether `name` can be a named export.
pub fn is_exportable(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && !RESERVED.contains(&name)
}

/// Module source that loads `id` with a created `require` and re-exports it,
/// as the default export and as one named export per usable property name.
pub fn render(id: &str, exports: &[String]) -> String {
    let mut out = format!(
        "import {{ createRequire }} from \"module\";\n\
         const cjsRequire = createRequire(import.meta.url);\n\
         const _M_ = cjsRequire({});\n\
         export default _M_;\n",
        json_string(id)
    );
    let names: BTreeSet<&str> = exports
        .iter()
        .map(String::as_str)
        .filter(|name| is_exportable(name))
        .collect();
    for name in names {
        out.push_str(&format!("export const {0} = _M_.{0};\n", name));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_id() {
        let out = Path::new("/app/dist/native");
        assert_eq!(
            relative_id(&shim_path(out, "sqlite3"), &out.join("sqlite3/index.js")).as_deref(),
            Some("./sqlite3/index.js")
        );
        assert_eq!(
            relative_id(
                &shim_path(out, "@serialport/bindings-cpp"),
                &out.join("node_natives/node_modules/@serialport/bindings-cpp")
            )
            .as_deref(),
            Some("../node_natives/node_modules/@serialport/bindings-cpp")
        );
    }

    #[test]
    fn test_render_filters_names() {
        let exports: Vec<String> = ["Database", "default", "verbose", "2x", "class", "Database"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let src = render("./sqlite3/index.js", &exports);
        assert!(src.contains("const _M_ = cjsRequire(\"./sqlite3/index.js\");"));
        assert!(src.contains("export default _M_;"));
        assert!(src.contains("export const Database = _M_.Database;"));
        assert!(src.contains("export const verbose = _M_.verbose;"));
        assert_eq!(src.matches("export const").count(), 2);
    }
}
