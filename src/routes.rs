use regex::Regex;

use crate::errors::AppError;

/// Decides whether a route participates in tracking at all.
///
/// Exclusion patterns are glob-style paths (`/admin/*`) converted to anchored
/// regular expressions, so `/admin/leads` is excluded while `/administration`
/// is not.
#[derive(Debug, Clone)]
pub struct RouteFilter {
    patterns: Vec<Regex>,
}

impl RouteFilter {
    pub fn from_globs(globs: &[String]) -> Result<Self, AppError> {
        let mut patterns = Vec::with_capacity(globs.len());
        for glob in globs {
            let regex = glob_to_regex(glob)
                .map_err(|e| AppError::InternalError(format!("Bad route pattern '{}': {}", glob, e)))?;
            patterns.push(regex);
        }
        Ok(Self { patterns })
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(path))
    }
}

/// Converts a glob-style path pattern to an anchored regex. Every regex
/// metacharacter is escaped except `*`, which matches any (possibly empty)
/// path remainder.
fn glob_to_regex(glob: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::with_capacity(glob.len() + 4);
    pattern.push('^');
    for (i, segment) in glob.split('*').enumerate() {
        if i > 0 {
            pattern.push_str(".*");
        }
        pattern.push_str(&regex::escape(segment));
    }
    pattern.push('$');
    Regex::new(&pattern)
}
