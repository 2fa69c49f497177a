//! ANSI/control-sequence sanitizer for the flat line view.
//!
//! Socket output is raw shell output: prompts set window titles, line
//! editors move the cursor, and programs toggle terminal modes. None of
//! that has a meaning in an append-only list of lines, so it is removed.
//! Color and style (SGR) sequences are kept as inline `<span>` markup.
//!
//! The passes run in a fixed order so that color codes are still intact
//! when they are converted:
//!
//! 1. OSC sequences (`ESC ] ... BEL` / `ESC ] ... ESC \`)
//! 2. CSI sequences with an uppercase final byte (cursor movement, erase)
//! 3. cursor save/restore, mode toggles, bracketed paste markers
//! 4. BEL and NUL bytes
//! 5. SGR → `<span style="...">` markup (text HTML-escaped)
//! 6. HTML entity decoding of the text produced by step 5
//!
//! Every pass is total. Sequences that are incomplete (for example split
//! across two socket messages) are not recognized; their ESC byte is
//! dropped in step 5 and the remaining bytes pass through as text.

const ESC: char = '\u{1b}';
const BEL: char = '\u{7}';
const NUL: char = '\0';

/// Sanitize one socket message for display.
///
/// Returns text with embedded `<span>` markup for colors. The text itself
/// is not HTML-escaped.
pub fn sanitize(raw: &str) -> String {
    decode_entities(&sanitize_html(raw))
}

/// Steps 1–5 only: returns well-formed HTML with escaped text.
pub fn sanitize_html(raw: &str) -> String {
    let text = strip_osc(raw);
    let text = strip_csi(&text, |csi| csi.final_byte.is_ascii_uppercase());
    let text = strip_modes(&text);
    let text: String = text.chars().filter(|&c| c != BEL && c != NUL).collect();
    sgr_to_markup(&text)
}

/// A complete CSI sequence `ESC [ params intermediates final`.
#[derive(Debug)]
struct Csi {
    params: String,
    final_byte: char,
    /// Index one past the final byte.
    end: usize,
}

/// Parse a CSI sequence starting at `start` (which must hold ESC).
fn parse_csi(chars: &[char], start: usize) -> Option<Csi> {
    if chars.get(start + 1) != Some(&'[') {
        return None;
    }
    let mut j = start + 2;
    let mut params = String::new();
    while let Some(&c) = chars.get(j) {
        if !('\u{30}'..='\u{3f}').contains(&c) {
            break;
        }
        params.push(c);
        j += 1;
    }
    while let Some(&c) = chars.get(j) {
        if !('\u{20}'..='\u{2f}').contains(&c) {
            break;
        }
        j += 1;
    }
    let final_byte = *chars.get(j)?;
    ('\u{40}'..='\u{7e}').contains(&final_byte).then(|| Csi {
        params,
        final_byte,
        end: j + 1,
    })
}

fn strip_osc(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == ESC && chars.get(i + 1) == Some(&']') {
            let mut k = i + 2;
            let mut end = None;
            while k < chars.len() {
                if chars[k] == BEL {
                    end = Some(k + 1);
                    break;
                }
                if chars[k] == ESC && chars.get(k + 1) == Some(&'\\') {
                    end = Some(k + 2);
                    break;
                }
                k += 1;
            }
            if let Some(end) = end {
                i = end;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn strip_csi(input: &str, remove: impl Fn(&Csi) -> bool) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == ESC {
            if let Some(csi) = parse_csi(&chars, i) {
                if remove(&csi) {
                    i = csi.end;
                    continue;
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Cursor save/restore, DEC/ANSI mode toggles, keypad and charset selects,
/// bracketed paste markers.
fn strip_modes(input: &str) -> String {
    let text = strip_csi(input, |csi| match csi.final_byte {
        's' | 'u' => !csi.params.starts_with('?'),
        'h' | 'l' => true,
        '~' => matches!(csi.params.as_str(), "200" | "201"),
        _ => false,
    });

    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == ESC {
            match chars.get(i + 1) {
                Some('7' | '8' | '=' | '>') => {
                    i += 2;
                    continue;
                }
                Some('(' | ')') if i + 2 < chars.len() => {
                    i += 3;
                    continue;
                }
                _ => {}
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Standard 16-color palette (normal 0–7, bright 8–15).
const PALETTE: [&str; 16] = [
    "#000000", "#ff0000", "#209805", "#e8bf03", "#0000ff", "#ff00ff", "#00ffee", "#f0f0f0",
    "#888888", "#ff5555", "#55ff55", "#ffff55", "#5c5cff", "#ff55ff", "#55ffff", "#ffffff",
];

/// Hex color for an xterm 256-color index.
fn color_256(index: u32) -> String {
    match index {
        0..=15 => PALETTE[index as usize].to_string(),
        16..=231 => {
            let i = index - 16;
            let level = |v: u32| if v == 0 { 0 } else { 55 + 40 * v };
            format!(
                "#{:02x}{:02x}{:02x}",
                level(i / 36),
                level((i / 6) % 6),
                level(i % 6)
            )
        }
        _ => {
            let gray = 8 + 10 * (index.min(255) - 232);
            format!("#{gray:02x}{gray:02x}{gray:02x}")
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Style {
    fg: Option<String>,
    bg: Option<String>,
    bold: bool,
    dim: bool,
    italic: bool,
    underline: bool,
    strike: bool,
    hidden: bool,
}

impl Style {
    fn is_plain(&self) -> bool {
        *self == Self::default()
    }

    fn css(&self) -> String {
        let mut parts = Vec::new();
        if let Some(fg) = &self.fg {
            parts.push(format!("color:{fg}"));
        }
        if let Some(bg) = &self.bg {
            parts.push(format!("background-color:{bg}"));
        }
        if self.bold {
            parts.push("font-weight:bold".to_string());
        }
        if self.dim {
            parts.push("opacity:0.6".to_string());
        }
        if self.italic {
            parts.push("font-style:italic".to_string());
        }
        match (self.underline, self.strike) {
            (true, true) => parts.push("text-decoration:underline line-through".to_string()),
            (true, false) => parts.push("text-decoration:underline".to_string()),
            (false, true) => parts.push("text-decoration:line-through".to_string()),
            (false, false) => {}
        }
        if self.hidden {
            parts.push("visibility:hidden".to_string());
        }
        parts.join(";")
    }

    /// Apply an SGR parameter list.
    fn apply(&mut self, params: &[u32]) {
        let mut i = 0;
        while i < params.len() {
            match params[i] {
                0 => *self = Self::default(),
                1 => self.bold = true,
                2 => self.dim = true,
                3 => self.italic = true,
                4 => self.underline = true,
                8 => self.hidden = true,
                9 => self.strike = true,
                22 => {
                    self.bold = false;
                    self.dim = false;
                }
                23 => self.italic = false,
                24 => self.underline = false,
                28 => self.hidden = false,
                29 => self.strike = false,
                n @ 30..=37 => self.fg = Some(PALETTE[(n - 30) as usize].to_string()),
                39 => self.fg = None,
                n @ 40..=47 => self.bg = Some(PALETTE[(n - 40) as usize].to_string()),
                49 => self.bg = None,
                n @ 90..=97 => self.fg = Some(PALETTE[(n - 90 + 8) as usize].to_string()),
                n @ 100..=107 => self.bg = Some(PALETTE[(n - 100 + 8) as usize].to_string()),
                n @ (38 | 48) => {
                    let (color, consumed) = extended_color(&params[i + 1..]);
                    if let Some(color) = color {
                        if n == 38 {
                            self.fg = Some(color);
                        } else {
                            self.bg = Some(color);
                        }
                    }
                    i += consumed;
                }
                _ => {}
            }
            i += 1;
        }
    }
}

/// Parse the tail of a `38;…`/`48;…` parameter. Returns the color and how
/// many parameters were consumed.
fn extended_color(rest: &[u32]) -> (Option<String>, usize) {
    match rest {
        [5, n, ..] => (Some(color_256(*n)), 2),
        [2, r, g, b, ..] => (
            Some(format!(
                "#{:02x}{:02x}{:02x}",
                (*r).min(255),
                (*g).min(255),
                (*b).min(255)
            )),
            4,
        ),
        [5] => (None, 1),
        [2, ..] => (None, rest.len()),
        _ => (None, 0),
    }
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        '\'' => out.push_str("&#39;"),
        _ => out.push(c),
    }
}

fn sgr_to_markup(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut style = Style::default();
    let mut span_open = false;
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != ESC {
            push_escaped(&mut out, chars[i]);
            i += 1;
            continue;
        }

        let Some(csi) = parse_csi(&chars, i) else {
            // Unrecognized or truncated: drop the ESC byte, keep the rest.
            i += 1;
            continue;
        };
        i = csi.end;

        if csi.final_byte != 'm' || csi.params.starts_with(['?', '>', '<', '=']) {
            continue;
        }
        let params: Vec<u32> = if csi.params.is_empty() {
            vec![0]
        } else {
            csi.params
                .split([';', ':'])
                .map(|p| p.parse::<u32>().unwrap_or(0))
                .collect()
        };

        let mut next = style.clone();
        next.apply(&params);
        if next == style {
            continue;
        }
        style = next;
        if span_open {
            out.push_str("</span>");
            span_open = false;
        }
        if !style.is_plain() {
            out.push_str("<span style=\"");
            out.push_str(&style.css());
            out.push_str("\">");
            span_open = true;
        }
    }

    if span_open {
        out.push_str("</span>");
    }
    out
}

/// Single left-to-right pass over named and numeric entities.
///
/// Unknown or malformed entities are kept verbatim.
fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let decoded = rest
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| decode_entity(&rest[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Remove the `<span>` markup produced by [`sanitize`], leaving plain text.
pub fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = [rest.find("<span style=\""), rest.find("</span>")]
        .into_iter()
        .flatten()
        .min()
    {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        rest = match rest.strip_prefix("</span>") {
            Some(after) => after,
            None => match rest.find("\">") {
                Some(end) => &rest[end + 2..],
                None => {
                    out.push_str(rest);
                    ""
                }
            },
        };
    }
    out.push_str(rest);
    out
}
