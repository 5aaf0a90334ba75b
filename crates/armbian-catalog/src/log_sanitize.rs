//! Cleanup for strings that come from outside the run (CRM records,
//! rsync listings, board files) before they reach a log line or a table cell.

const MAX_LOG_CHARS: usize = 1024;

enum EscapeMode {
    Esc,
    Csi,
    Osc,
    OscEsc,
    // DCS, SOS, PM and APC run until `ESC \`
    StTerminated,
    StEsc,
}

fn strip_controls(input: &str, limit: Option<usize>) -> (String, bool) {
    let mut out = String::with_capacity(input.len());
    let mut esc_mode: Option<EscapeMode> = None;
    let mut char_count = 0usize;

    for c in input.chars() {
        if let Some(mode) = esc_mode.as_ref() {
            match mode {
                EscapeMode::Esc => match c {
                    '[' => esc_mode = Some(EscapeMode::Csi),
                    ']' => esc_mode = Some(EscapeMode::Osc),
                    'P' | 'X' | '^' | '_' => esc_mode = Some(EscapeMode::StTerminated),
                    _ => esc_mode = None,
                },
                EscapeMode::Csi => {
                    if ('@'..='~').contains(&c) {
                        esc_mode = None;
                    }
                }
                EscapeMode::Osc => {
                    if c == '\x07' {
                        esc_mode = None;
                    } else if c == '\x1b' {
                        esc_mode = Some(EscapeMode::OscEsc);
                    }
                }
                EscapeMode::OscEsc => {
                    if c == '\\' {
                        esc_mode = None;
                    } else if c != '\x1b' {
                        esc_mode = Some(EscapeMode::Osc);
                    }
                }
                EscapeMode::StTerminated => {
                    if c == '\x1b' {
                        esc_mode = Some(EscapeMode::StEsc);
                    }
                }
                EscapeMode::StEsc => {
                    if c == '\\' {
                        esc_mode = None;
                    } else if c != '\x1b' {
                        esc_mode = Some(EscapeMode::StTerminated);
                    }
                }
            }
            continue;
        }

        match c {
            '\x1b' => {
                esc_mode = Some(EscapeMode::Esc);
                continue;
            }
            '\t' | '\r' | '\n' => out.push(' '),
            c if c.is_control() || is_format_control(c) => continue,
            c => out.push(c),
        }

        char_count += 1;
        if limit.is_some_and(|l| char_count >= l) {
            return (out, true);
        }
    }

    (out, false)
}

pub fn sanitize_log_line(input: &str) -> String {
    let (mut out, truncated) = strip_controls(input, Some(MAX_LOG_CHARS));
    if truncated {
        out.push_str(" ...[truncated]");
    }
    out
}

/// A value safe to place in one cell of the pipe-delimited asset table: no
/// control characters or line breaks, surrounding whitespace trimmed. The
/// delimiter is left alone; quoting keeps it inside the cell.
pub fn sanitize_cell(input: &str) -> String {
    let (out, _) = strip_controls(input, None);
    out.trim().to_string()
}

fn is_format_control(c: char) -> bool {
    c == '\u{061C}'
        || c == '\u{200E}'
        || c == '\u{200F}'
        || ('\u{202A}'..='\u{202E}').contains(&c)
        || ('\u{2066}'..='\u{2069}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::{sanitize_cell, sanitize_log_line};

    #[test]
    fn strips_ansi_sequences_from_log_lines() {
        let input = "vendor \u{1b}[31mxunlong\u{1b}[0m \u{1b}]0;title\u{7}ok";
        assert_eq!(sanitize_log_line(input), "vendor xunlong ok");
    }

    #[test]
    fn long_log_lines_are_truncated() {
        let input = "x".repeat(5000);
        let got = sanitize_log_line(&input);
        assert!(got.ends_with(" ...[truncated]"));
        assert_eq!(got.chars().filter(|c| *c == 'x').count(), 1024);
    }

    #[test]
    fn string_terminated_sequences_are_dropped() {
        let input = "a\u{1b}Pq#0;2;0;0;0\u{1b}\\b\u{1b}_apc payload\u{1b}\\c\u{1b}^pm\u{1b}\\d";
        assert_eq!(sanitize_log_line(input), "abcd");
        assert_eq!(sanitize_cell("\u{1b}Xsos\u{1b}\u{1b}\\ok"), "ok");
    }

    #[test]
    fn cells_keep_content_but_lose_line_breaks() {
        let got = sanitize_cell("  Shenzhen | Xunlong\nSoftware\u{202e} ");
        assert_eq!(got, "Shenzhen | Xunlong Software");

        let long = "y".repeat(5000);
        assert_eq!(sanitize_cell(&long), long);
    }
}
