//! C++ output fixups
//!
//! Generated sources live next to Go code, so each file is fenced off
//! from regular Go builds, and includes written against the module path
//! are made relative to the including file.

use crate::postprocess::paths::{has_build_condition, relative_path};
use regex::{Captures, Regex};

/// Build condition prepended to every C++ file
pub const CPP_BUILD_TAG: &str = "//go:build deps_only && cgo";

/// Matches `#include "<module>/<path>.pb.h"` for one module
pub fn include_pattern(module_path: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r#"#include "{}/([^"]+\.pb\.h)""#,
        regex::escape(module_path)
    ))
}

/// Rewrite one C++ file's content.
///
/// `file_dir` is the file's project-relative directory.
pub fn rewrite(content: &str, file_dir: &str, includes: &Regex) -> String {
    let mut out = if has_build_condition(content) {
        content.to_string()
    } else {
        format!("{}\n\n{}", CPP_BUILD_TAG, content)
    };

    if includes.is_match(&out) {
        out = includes
            .replace_all(&out, |caps: &Captures| {
                format!("#include \"{}\"", relative_path(file_dir, &caps[1]))
            })
            .into_owned();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULE: &str = "github.com/acme/widgets";

    fn includes() -> Regex {
        include_pattern(MODULE).unwrap()
    }

    #[test]
    fn prepends_tag_and_rewrites_includes() {
        let input = "#include \"github.com/acme/widgets/pkg/echo.pb.h\"\n\
                     #include \"github.com/acme/widgets/types/t.pb.h\"\n\
                     #include <string>\n";
        let out = rewrite(input, "pkg", &includes());
        assert_eq!(
            out,
            "//go:build deps_only && cgo\n\n\
             #include \"echo.pb.h\"\n\
             #include \"../types/t.pb.h\"\n\
             #include <string>\n"
        );
    }

    #[test]
    fn idempotent() {
        let input = "#include \"github.com/acme/widgets/a/b/x.pb.h\"\nint x;\n";
        let once = rewrite(input, "a", &includes());
        let twice = rewrite(&once, "a", &includes());
        assert_eq!(once, twice);
        assert!(once.contains("#include \"b/x.pb.h\""));
    }

    #[test]
    fn keeps_existing_build_condition() {
        let input = "//go:build cgo\n#include <vector>\n";
        assert_eq!(rewrite(input, "", &includes()), input);
    }

    #[test]
    fn other_modules_untouched() {
        let input = "//go:build deps_only && cgo\n\n#include \"github.com/other/mod/x.pb.h\"\n";
        assert_eq!(rewrite(input, "pkg", &includes()), input);
    }

    #[test]
    fn module_path_is_escaped() {
        let re = include_pattern("example.com/m").unwrap();
        assert!(!re.is_match("#include \"exampleXcom/m/x.pb.h\""));
        assert!(re.is_match("#include \"example.com/m/x.pb.h\""));
    }
}
