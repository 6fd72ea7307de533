//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let cut = (0..=max).rev().find(|i| s.is_char_boundary(*i)).unwrap_or(0);
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_template_replaces_all_occurrences() {
    let out = fill_template("{a} and {b} and {a}", &[("a", "x"), ("b", "y")]);
    assert_eq!(out, "x and y and x");
  }
}
