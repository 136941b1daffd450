//! Template compilation and per-call argument resolution.

use crate::error::TemplateError;
use loadtest_sampler::IdChain;
use std::collections::BTreeSet;
use std::fmt;

/// Rendered in place of an argument whose position is past the chain.
pub const NULL_LITERAL: &str = "null";

/// A distinct argument slot of a compiled template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotRef {
    /// Fixed 1-based position in the chain.
    Absolute(usize),
    /// Position counted up from the bottom of the chain supplied at call time.
    DepthUp(usize),
}

impl SlotRef {
    /// 1-based chain position this slot reads for a chain of `chain_len` ids.
    pub fn resolve(&self, chain_len: usize) -> usize {
        match *self {
            SlotRef::Absolute(position) => position,
            SlotRef::DepthUp(up) => (chain_len + 1).saturating_sub(up).max(1),
        }
    }

    /// Id this slot reads from `chain`.
    ///
    /// Depth-up slots count from the bottom of the chain and clamp to its
    /// first id; absolute positions past the end give `None`.
    pub fn lookup<'c, T>(&self, chain: &'c IdChain<T>) -> Option<&'c T> {
        match *self {
            SlotRef::Absolute(position) => chain.position(position),
            SlotRef::DepthUp(up) => chain
                .from_bottom(up.saturating_sub(1))
                .or_else(|| chain.first()),
        }
    }

    /// Highest position this slot may reference.
    fn reach(&self) -> usize {
        match *self {
            SlotRef::Absolute(n) | SlotRef::DepthUp(n) => n,
        }
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotRef::Absolute(n) => write!(f, "%{n}$s"),
            SlotRef::DepthUp(n) => write!(f, "%-{n}$s"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(SlotRef),
}

/// Placeholder as written, before bare ones get a position.
enum Token {
    Literal(String),
    Bare,
    Slot(SlotRef),
}

/// A compiled query template.
///
/// Compilation happens once; [`get_ids`](Self::get_ids) and
/// [`render`](Self::render) are cheap and can be called for every dispatched
/// call against a newly sampled chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    source: String,
    format: String,
    segments: Vec<Segment>,
    args: Vec<SlotRef>,
    max_args_position: usize,
    has_depth_up_args: bool,
}

impl QueryTemplate {
    /// Compile `template` into its canonical positional form.
    pub fn compile(template: &str) -> Result<Self, TemplateError> {
        let tokens = tokenize(template)?;

        let explicit: BTreeSet<usize> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Slot(SlotRef::Absolute(n)) => Some(*n),
                _ => None,
            })
            .collect();

        let mut next_free = 1;
        let mut segments = Vec::with_capacity(tokens.len());
        for token in tokens {
            let segment = match token {
                Token::Literal(text) => Segment::Literal(text),
                Token::Slot(slot) => Segment::Slot(slot),
                Token::Bare => {
                    while explicit.contains(&next_free) {
                        next_free += 1;
                    }
                    let slot = SlotRef::Absolute(next_free);
                    next_free += 1;
                    Segment::Slot(slot)
                }
            };
            segments.push(segment);
        }

        let mut args: Vec<SlotRef> = Vec::new();
        let mut format = String::with_capacity(template.len());
        for segment in &segments {
            match segment {
                Segment::Literal(text) => format.push_str(&text.replace('%', "%%")),
                Segment::Slot(slot) => {
                    format.push_str(&slot.to_string());
                    if !args.contains(slot) {
                        args.push(*slot);
                    }
                }
            }
        }

        let max_args_position = args.iter().map(SlotRef::reach).max().unwrap_or(0);
        let has_depth_up_args = args.iter().any(|s| matches!(s, SlotRef::DepthUp(_)));

        Ok(Self {
            source: template.to_string(),
            format,
            segments,
            args,
            max_args_position,
            has_depth_up_args,
        })
    }

    /// The template as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Canonical format with every placeholder written as `%k$s` (or `%-k$s`).
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Distinct argument slots in order of first appearance.
    pub fn args(&self) -> &[SlotRef] {
        &self.args
    }

    /// Number of distinct argument slots.
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Highest position referenced by any placeholder.
    pub fn max_args_position(&self) -> usize {
        self.max_args_position
    }

    /// Whether any placeholder is relative to the bottom of the chain.
    pub fn has_depth_up_args(&self) -> bool {
        self.has_depth_up_args
    }

    /// Shortest chain that covers every absolute position.
    pub fn chain_length(&self) -> usize {
        self.max_args_position.max(1)
    }

    /// Chain length to request from a sampler whose topology is `depth` hops deep.
    ///
    /// Depth-up placeholders read from the bottom of the chain, so templates
    /// that use them ask for a full-depth chain.
    pub fn chain_length_for(&self, depth: usize) -> usize {
        if self.has_depth_up_args {
            self.chain_length().max(depth + 1)
        } else {
            self.chain_length()
        }
    }

    /// Format with depth-up placeholders resolved for a chain of `chain_len` ids.
    pub fn format_for(&self, chain_len: usize) -> String {
        let mut out = String::with_capacity(self.format.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(&text.replace('%', "%%")),
                Segment::Slot(slot) => {
                    out.push_str(&SlotRef::Absolute(slot.resolve(chain_len)).to_string())
                }
            }
        }
        out
    }

    /// Argument values for each distinct slot; `None` past the end of the chain.
    pub fn get_ids<T: Clone>(&self, chain: &IdChain<T>) -> Vec<Option<T>> {
        self.args
            .iter()
            .map(|slot| slot.lookup(chain).cloned())
            .collect()
    }

    /// Render the final query text for `chain`.
    ///
    /// Positions past the end of the chain render as [`NULL_LITERAL`].
    pub fn render<T: fmt::Display>(&self, chain: &IdChain<T>) -> String {
        let mut out = String::with_capacity(self.source.len() + 16 * self.args.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(slot) => match slot.lookup(chain) {
                    Some(id) => out.push_str(&id.to_string()),
                    None => out.push_str(NULL_LITERAL),
                },
            }
        }
        out
    }
}

impl fmt::Display for QueryTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format)
    }
}

fn tokenize(template: &str) -> Result<Vec<Token>, TemplateError> {
    let bytes = template.as_bytes();
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        literal.push_str(&template[literal_start..i]);
        let start = i;
        i += 1;

        match bytes.get(i) {
            None => return Err(TemplateError::Unterminated { offset: start }),
            Some(b'%') => {
                literal.push('%');
                i += 1;
            }
            Some(b's') => {
                flush(&mut tokens, &mut literal);
                tokens.push(Token::Bare);
                i += 1;
            }
            Some(_) => {
                let negative = bytes[i] == b'-';
                if negative {
                    i += 1;
                }
                let digits_start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if i == digits_start {
                    return Err(invalid(template, start));
                }
                match (bytes.get(i), bytes.get(i + 1)) {
                    (Some(b'$'), Some(b's')) => {}
                    (None, _) | (Some(b'$'), None) => {
                        return Err(TemplateError::Unterminated { offset: start })
                    }
                    _ => return Err(invalid(template, start)),
                }
                let position: usize = template[digits_start..i]
                    .parse()
                    .map_err(|_| invalid(template, start))?;
                if position == 0 {
                    return Err(TemplateError::ZeroPosition { offset: start });
                }
                i += 2;

                flush(&mut tokens, &mut literal);
                tokens.push(Token::Slot(if negative {
                    SlotRef::DepthUp(position)
                } else {
                    SlotRef::Absolute(position)
                }));
            }
        }
        literal_start = i;
    }

    literal.push_str(&template[literal_start..]);
    flush(&mut tokens, &mut literal);
    Ok(tokens)
}

fn flush(tokens: &mut Vec<Token>, literal: &mut String) {
    if !literal.is_empty() {
        tokens.push(Token::Literal(std::mem::take(literal)));
    }
}

fn invalid(template: &str, offset: usize) -> TemplateError {
    let found: String = template[offset..].chars().take(6).collect();
    TemplateError::InvalidPlaceholder { offset, found }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(len: u64) -> IdChain<u64> {
        IdChain::from((1..=len).map(|i| i * 100).collect::<Vec<_>>())
    }

    #[test]
    fn test_bare_placeholder() {
        let template = QueryTemplate::compile("g.V(%s).out().count().toList()").unwrap();

        assert_eq!(template.format(), "g.V(%1$s).out().count().toList()");
        assert_eq!(template.arg_count(), 1);
        assert_eq!(template.max_args_position(), 1);
        assert!(!template.has_depth_up_args());
        assert_eq!(
            template.render(&IdChain::from(vec![100])),
            "g.V(100).out().count().toList()"
        );
    }

    #[test]
    fn test_bare_placeholders_are_sequential() {
        let template = QueryTemplate::compile("g.V(%s).out().hasId(%s)").unwrap();
        assert_eq!(template.format(), "g.V(%1$s).out().hasId(%2$s)");
        assert_eq!(template.render(&chain(2)), "g.V(100).out().hasId(200)");
    }

    #[test]
    fn test_bare_skips_explicit_positions() {
        let template = QueryTemplate::compile("%s %1$s %s").unwrap();
        assert_eq!(template.format(), "%2$s %1$s %3$s");
        assert_eq!(
            template.args(),
            &[
                SlotRef::Absolute(2),
                SlotRef::Absolute(1),
                SlotRef::Absolute(3)
            ]
        );
    }

    #[test]
    fn test_sparse_explicit_positions() {
        let template = QueryTemplate::compile("g.V(%8$s).out().hasId(%4$s)").unwrap();

        assert_eq!(template.max_args_position(), 8);
        assert_eq!(template.arg_count(), 2);
        assert_eq!(template.get_ids(&chain(8)), vec![Some(800), Some(400)]);
    }

    #[test]
    fn test_repeated_position_collapses() {
        let template = QueryTemplate::compile("%2$s-%2$s-%1$s").unwrap();
        assert_eq!(template.arg_count(), 2);
        assert_eq!(template.render(&chain(2)), "200-200-100");
    }

    #[test]
    fn test_depth_up_resolves_against_chain_length() {
        let template = QueryTemplate::compile("g.V(%-9$s)").unwrap();
        assert!(template.has_depth_up_args());
        assert_eq!(template.format(), "g.V(%-9$s)");
        assert_eq!(template.max_args_position(), 9);

        assert_eq!(template.get_ids(&chain(9)), vec![Some(100)]);
        assert_eq!(template.format_for(9), "g.V(%1$s)");

        let up_one = QueryTemplate::compile("g.V(%-1$s)").unwrap();
        assert_eq!(up_one.render(&chain(9)), "g.V(900)");
        assert_eq!(up_one.render(&chain(3)), "g.V(300)");
    }

    #[test]
    fn test_depth_up_clamps_to_first_position() {
        let template = QueryTemplate::compile("g.V(%-12$s)").unwrap();
        assert_eq!(template.get_ids(&chain(9)), vec![Some(100)]);
        assert_eq!(template.format_for(9), "g.V(%1$s)");
    }

    #[test]
    fn test_position_past_chain_is_null() {
        let template = QueryTemplate::compile("g.V(%11$s).out(%1$s)").unwrap();
        assert_eq!(template.get_ids(&chain(9)), vec![None, Some(100)]);
        assert_eq!(template.render(&chain(9)), "g.V(null).out(100)");
    }

    #[test]
    fn test_render_is_repeatable_across_chains() {
        let template =
            QueryTemplate::compile("g.V(%1$s).repeat(out()).until(hasId(%-1$s))").unwrap();
        let first = template.render(&IdChain::from(vec!["a", "b"]));
        let second = template.render(&IdChain::from(vec!["x", "y", "z"]));

        assert_eq!(first, "g.V(a).repeat(out()).until(hasId(b))");
        assert_eq!(second, "g.V(x).repeat(out()).until(hasId(z))");
        assert_eq!(
            template.format(),
            "g.V(%1$s).repeat(out()).until(hasId(%-1$s))"
        );
    }

    #[test]
    fn test_lookup_matches_resolved_position() {
        let chain = chain(5);
        for slot in [
            SlotRef::Absolute(1),
            SlotRef::Absolute(5),
            SlotRef::Absolute(6),
            SlotRef::DepthUp(1),
            SlotRef::DepthUp(3),
            SlotRef::DepthUp(5),
            SlotRef::DepthUp(9),
        ] {
            assert_eq!(slot.lookup(&chain), chain.position(slot.resolve(chain.len())));
        }
        assert_eq!(SlotRef::DepthUp(2).lookup(&chain), Some(&400));
        assert_eq!(SlotRef::DepthUp(1).lookup(&IdChain::<u64>::default()), None);
    }

    #[test]
    fn test_chain_length_for_topology_depth() {
        let absolute = QueryTemplate::compile("g.V(%s).out().hasId(%3$s)").unwrap();
        assert_eq!(absolute.chain_length_for(7), 3);

        let depth_up = QueryTemplate::compile("g.V(%s).out().hasId(%-1$s)").unwrap();
        assert_eq!(depth_up.chain_length(), 1);
        assert_eq!(depth_up.chain_length_for(3), 4);
        assert_eq!(depth_up.chain_length_for(0), 1);

        let deep_up = QueryTemplate::compile("g.V(%-6$s)").unwrap();
        assert_eq!(deep_up.chain_length_for(2), 6);
    }

    #[test]
    fn test_literal_percent() {
        let template = QueryTemplate::compile("100%% of %s").unwrap();
        assert_eq!(template.format(), "100%% of %1$s");
        assert_eq!(template.render(&chain(1)), "100% of 100");
    }

    #[test]
    fn test_no_placeholders() {
        let template = QueryTemplate::compile("g.V().count()").unwrap();
        assert_eq!(template.arg_count(), 0);
        assert_eq!(template.max_args_position(), 0);
        assert_eq!(template.chain_length(), 1);
        assert_eq!(template.render(&chain(0)), "g.V().count()");
    }

    #[test]
    fn test_invalid_placeholders() {
        assert_eq!(
            QueryTemplate::compile("g.V(%d)"),
            Err(TemplateError::InvalidPlaceholder {
                offset: 4,
                found: "%d)".to_string()
            })
        );
        assert_eq!(
            QueryTemplate::compile("g.V(%0$s)"),
            Err(TemplateError::ZeroPosition { offset: 4 })
        );
        assert_eq!(
            QueryTemplate::compile("g.V(%-0$s)"),
            Err(TemplateError::ZeroPosition { offset: 4 })
        );
        assert_eq!(
            QueryTemplate::compile("g.V(%"),
            Err(TemplateError::Unterminated { offset: 4 })
        );
        assert_eq!(
            QueryTemplate::compile("g.V(%3"),
            Err(TemplateError::Unterminated { offset: 4 })
        );
        assert!(matches!(
            QueryTemplate::compile("g.V(%3d)"),
            Err(TemplateError::InvalidPlaceholder { offset: 4, .. })
        ));
    }

    #[test]
    fn test_non_ascii_literals() {
        let template = QueryTemplate::compile("g.V(%s).has('név', 'ü')").unwrap();
        assert_eq!(template.render(&chain(1)), "g.V(100).has('név', 'ü')");
    }
}
