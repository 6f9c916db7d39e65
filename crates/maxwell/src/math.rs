//! Mixed prose/math rendering.
//!
//! Model output interleaves prose with TeX spans: `$$...$$` or `\[...\]` for
//! display math, `$...$` or `\(...\)` for inline math. The text is split into
//! ordered segments, non-math text is kept verbatim, and each math span goes
//! through a [`Typesetter`]. A span the typesetter rejects falls back to its
//! literal source; with no typesetter at all the input comes back untouched.

use std::sync::LazyLock;

use regex::Regex;

// Alternation order matters: `$$` must be tried before `$`.
static MATH_SPAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$(.+?)\$\$|\$(.+?)\$|(?s:\\\[(.+?)\\\])|(?s:\\\((.+?)\\\))")
        .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathStyle {
    Inline,
    Display,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Math {
        /// TeX between the delimiters.
        tex: &'a str,
        /// The whole span including delimiters, used when typesetting fails.
        source: &'a str,
        style: MathStyle,
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypesetError {
    #[error("empty math expression")]
    Empty,

    #[error("unbalanced braces in {0:?}")]
    UnbalancedBraces(String),
}

/// The external `render(tex, options) -> markup` capability.
pub trait Typesetter {
    fn typeset(&self, tex: &str, style: MathStyle) -> Result<String, TypesetError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Text(String),
    Markup(String),
}

impl Rendered {
    pub fn as_str(&self) -> &str {
        match self {
            Rendered::Text(s) | Rendered::Markup(s) => s,
        }
    }
}

pub fn split_math(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut last = 0;
    for caps in MATH_SPAN_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            segments.push(Segment::Text(&text[last..whole.start()]));
        }
        let (tex, style) = match (caps.get(1), caps.get(2), caps.get(3), caps.get(4)) {
            (Some(m), ..) => (m.as_str(), MathStyle::Display),
            (_, Some(m), ..) => (m.as_str(), MathStyle::Inline),
            (_, _, Some(m), _) => (m.as_str(), MathStyle::Display),
            (_, _, _, Some(m)) => (m.as_str(), MathStyle::Inline),
            _ => continue,
        };
        segments.push(Segment::Math {
            tex,
            source: whole.as_str(),
            style,
        });
        last = whole.end();
    }
    if last < text.len() {
        segments.push(Segment::Text(&text[last..]));
    }
    segments
}

pub fn render(text: &str, typesetter: Option<&dyn Typesetter>) -> Vec<Rendered> {
    let Some(typesetter) = typesetter else {
        return vec![Rendered::Text(text.to_string())];
    };
    split_math(text)
        .into_iter()
        .map(|segment| match segment {
            Segment::Text(t) => Rendered::Text(t.to_string()),
            Segment::Math { tex, source, style } => match typesetter.typeset(tex, style) {
                Ok(markup) => Rendered::Markup(markup),
                Err(e) => {
                    tracing::debug!(error = %e, "typesetting failed, showing source");
                    Rendered::Text(source.to_string())
                }
            },
        })
        .collect()
}

pub fn render_to_string(text: &str, typesetter: Option<&dyn Typesetter>) -> String {
    render(text, typesetter)
        .iter()
        .map(Rendered::as_str)
        .collect()
}

/// Plain-terminal typesetting: common TeX symbols become Unicode, display math
/// gets its own indented line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalTypesetter;

const SYMBOLS: &[(&str, &str)] = &[
    (r"\Omega", "Ω"),
    (r"\omega", "ω"),
    (r"\mu", "μ"),
    (r"\pi", "π"),
    (r"\theta", "θ"),
    (r"\phi", "φ"),
    (r"\Delta", "Δ"),
    (r"\cdot", "·"),
    (r"\times", "×"),
    (r"\approx", "≈"),
    (r"\parallel", "∥"),
    (r"\rightarrow", "→"),
    (r"\sqrt", "√"),
    (r"\,", " "),
    (r"\left", ""),
    (r"\right", ""),
];

impl Typesetter for TerminalTypesetter {
    fn typeset(&self, tex: &str, style: MathStyle) -> Result<String, TypesetError> {
        let tex = tex.trim();
        if tex.is_empty() {
            return Err(TypesetError::Empty);
        }
        if !braces_balanced(tex) {
            return Err(TypesetError::UnbalancedBraces(tex.to_string()));
        }
        let mut out = tex.to_string();
        for (from, to) in SYMBOLS {
            out = out.replace(from, to);
        }
        Ok(match style {
            MathStyle::Inline => out,
            MathStyle::Display => format!("\n    {out}\n"),
        })
    }
}

fn braces_balanced(tex: &str) -> bool {
    let mut depth: i32 = 0;
    let mut escaped = false;
    for c in tex.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl Typesetter for Failing {
        fn typeset(&self, tex: &str, _: MathStyle) -> Result<String, TypesetError> {
            Err(TypesetError::UnbalancedBraces(tex.to_string()))
        }
    }

    struct Tagging;

    impl Typesetter for Tagging {
        fn typeset(&self, tex: &str, style: MathStyle) -> Result<String, TypesetError> {
            Ok(format!("<{style:?}>{tex}</{style:?}>"))
        }
    }

    #[test]
    fn splits_inline_math_and_keeps_prose() {
        let segments = split_math("$x$ is $V=IR$");
        let math: Vec<&str> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Math { tex, .. } => Some(*tex),
                Segment::Text(_) => None,
            })
            .collect();
        let text: Vec<&str> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Text(t) => Some(*t),
                Segment::Math { .. } => None,
            })
            .collect();
        assert_eq!(math, vec!["x", "V=IR"]);
        assert_eq!(text, vec![" is "]);
    }

    #[test]
    fn without_typesetter_input_is_verbatim() {
        let input = "$x$ is $V=IR$";
        assert_eq!(render(input, None), vec![Rendered::Text(input.to_string())]);
    }

    #[test]
    fn display_and_inline_styles() {
        let segments = split_math(r"Total: $$R_{eq} = R_1 + R_2$$ so \(I = V/R\) and \[P = VI\]");
        let styles: Vec<MathStyle> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Math { style, .. } => Some(*style),
                Segment::Text(_) => None,
            })
            .collect();
        assert_eq!(
            styles,
            vec![MathStyle::Display, MathStyle::Inline, MathStyle::Display]
        );
        assert_eq!(segments[0], Segment::Text("Total: "));
    }

    #[test]
    fn failed_span_degrades_to_literal_source() {
        let out = render_to_string("Use $V=IR$ here", Some(&Failing));
        assert_eq!(out, "Use $V=IR$ here");
    }

    #[test]
    fn typeset_spans_keep_order() {
        let out = render("a $x$ b $$y$$ c", Some(&Tagging));
        assert_eq!(
            out,
            vec![
                Rendered::Text("a ".to_string()),
                Rendered::Markup("<Inline>x</Inline>".to_string()),
                Rendered::Text(" b ".to_string()),
                Rendered::Markup("<Display>y</Display>".to_string()),
                Rendered::Text(" c".to_string()),
            ]
        );
    }

    #[test]
    fn text_without_math_is_one_segment() {
        assert_eq!(split_math("plain words"), vec![Segment::Text("plain words")]);
        assert!(split_math("").is_empty());
    }

    #[test]
    fn terminal_typesetter_symbols_and_errors() {
        let t = TerminalTypesetter;
        assert_eq!(t.typeset(r"300\,\Omega", MathStyle::Inline).unwrap(), "300 Ω");
        assert_eq!(
            t.typeset("R_{eq}", MathStyle::Display).unwrap(),
            "\n    R_{eq}\n"
        );
        assert!(matches!(
            t.typeset(r"\frac{1{2}", MathStyle::Inline),
            Err(TypesetError::UnbalancedBraces(_))
        ));
        assert_eq!(t.typeset("  ", MathStyle::Inline), Err(TypesetError::Empty));
    }

    #[test]
    fn terminal_rendering_degrades_only_the_bad_span() {
        let out = render_to_string(r"ok $\pi$ bad $\frac{1$", Some(&TerminalTypesetter));
        assert_eq!(out, r"ok π bad $\frac{1$");
    }
}
