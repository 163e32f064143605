//! HTML fragment parser.
//!
//! A small, lenient tokenizer: elements, void elements, quoted, unquoted and
//! bare attributes, comments, character references and raw-text elements.
//! Unmatched closing tags are ignored and unclosed elements are closed at
//! the end of input. Attribute names are lower-cased but otherwise kept as
//! written, so template syntax such as `@click:once` or `style.width.px`
//! survives.

use std::borrow::Cow;

use super::{
    NodeId, VOID_ELEMENTS, append_child, create_comment, create_element, create_fragment,
    create_text, has_attribute, set_attribute, tag_name,
};

/// Elements whose content is not parsed as markup.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Parse `html` into a new fragment.
pub fn parse_fragment(html: &str) -> NodeId {
    let fragment = create_fragment();
    let mut parser = Parser {
        input: html,
        lower: html.to_ascii_lowercase(),
        pos: 0,
        stack: vec![fragment],
    };
    parser.run();
    fragment
}

struct Parser<'a> {
    input: &'a str,
    /// ASCII-lower-cased copy, same byte offsets as `input`.
    lower: String,
    pos: usize,
    stack: Vec<NodeId>,
}

impl Parser<'_> {
    fn run(&mut self) {
        while self.pos < self.input.len() {
            let rest = &self.input[self.pos..];

            if rest.starts_with("<!--") {
                self.comment();
            } else if rest.starts_with("</") {
                self.close_tag();
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                self.skip_past('>');
            } else if rest.starts_with('<')
                && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic())
            {
                self.open_tag();
            } else {
                self.text();
            }
        }
    }

    fn current(&self) -> NodeId {
        // The fragment is never popped.
        self.stack[self.stack.len() - 1]
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.input[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn skip_past(&mut self, c: char) {
        self.pos = self.input[self.pos..]
            .find(c)
            .map_or(self.input.len(), |offset| self.pos + offset + c.len_utf8());
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> &str {
        let start = self.pos;
        let rest = &self.input[start..];
        let length = rest.find(|c: char| !keep(c)).unwrap_or(rest.len());
        self.pos += length;
        &self.input[start..start + length]
    }

    fn text(&mut self) {
        let start = self.pos;
        let search_from = start + self.peek().map_or(1, char::len_utf8);
        let end = self.input[search_from..]
            .find('<')
            .map_or(self.input.len(), |offset| search_from + offset);
        self.pos = end;

        let text = decode(&self.input[start..end]);
        if !text.is_empty() {
            append_child(self.current(), create_text(&text));
        }
    }

    fn comment(&mut self) {
        let start = self.pos + 4;
        let (data, next) = match self.input[start..].find("-->") {
            Some(offset) => (&self.input[start..start + offset], start + offset + 3),
            None => (&self.input[start..], self.input.len()),
        };
        append_child(self.current(), create_comment(data));
        self.pos = next;
    }

    fn close_tag(&mut self) {
        self.pos += 2;
        let name = self
            .take_while(|c| c != '>' && !c.is_whitespace())
            .to_ascii_lowercase();
        self.skip_past('>');

        let open = self
            .stack
            .iter()
            .skip(1)
            .rposition(|node| tag_name(*node).as_deref() == Some(name.as_str()));

        if let Some(index) = open {
            self.stack.truncate(index + 1);
        }
    }

    fn open_tag(&mut self) {
        self.pos += 1;
        let name = self
            .take_while(|c| !c.is_whitespace() && c != '/' && c != '>')
            .to_ascii_lowercase();
        let element = create_element(&name);
        let self_closing = self.attributes(element);

        append_child(self.current(), element);

        if self_closing || VOID_ELEMENTS.contains(&name.as_str()) {
            return;
        }

        if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            self.raw_text(element, &name);
        } else {
            self.stack.push(element);
        }
    }

    /// Parse attributes up to the end of the tag. Returns whether the tag
    /// was self-closing.
    fn attributes(&mut self, element: NodeId) -> bool {
        loop {
            self.skip_whitespace();

            match self.peek() {
                None => return false,
                Some('>') => {
                    self.pos += 1;
                    return false;
                }
                Some('/') if self.input[self.pos..].starts_with("/>") => {
                    self.pos += 2;
                    return true;
                }
                Some('/' | '=' | '"' | '\'') => {
                    self.pos += 1;
                    continue;
                }
                Some(_) => {}
            }

            let name = self
                .take_while(|c| !c.is_whitespace() && !matches!(c, '=' | '>' | '/' | '"' | '\''))
                .to_ascii_lowercase();

            self.skip_whitespace();
            let value = if self.peek() == Some('=') {
                self.pos += 1;
                self.skip_whitespace();
                self.attribute_value()
            } else {
                String::new()
            };

            if !has_attribute(element, &name) {
                set_attribute(element, &name, &value);
            }
        }
    }

    fn attribute_value(&mut self) -> String {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let value = self.take_while(|c| c != quote).to_string();
                self.pos = (self.pos + 1).min(self.input.len());
                decode(&value).into_owned()
            }
            // An unquoted comment keeps its own `>`.
            _ if self.input[self.pos..].starts_with("<!--") => {
                let start = self.pos;
                self.pos = self.input[start..]
                    .find("-->")
                    .map_or(self.input.len(), |offset| start + offset + 3);
                self.input[start..self.pos].to_string()
            }
            _ => {
                let value = self.take_while(|c| !c.is_whitespace() && c != '>');
                decode(value).into_owned()
            }
        }
    }

    fn raw_text(&mut self, element: NodeId, name: &str) {
        let closing = format!("</{name}");
        let end = self.lower[self.pos..]
            .find(&closing)
            .map_or(self.input.len(), |offset| self.pos + offset);

        let text = &self.input[self.pos..end];
        if !text.is_empty() {
            let text = if name == "script" || name == "style" {
                Cow::Borrowed(text)
            } else {
                decode(text)
            };
            append_child(element, create_text(&text));
        }

        self.pos = end;
        if end < self.input.len() {
            self.pos += closing.len();
            self.skip_past('>');
        }
    }
}

/// Replace character references with the characters they stand for.
/// Unknown references are kept as written.
pub fn decode(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }

    let mut decoded = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        decoded.push_str(&rest[..start]);
        rest = &rest[start..];

        let reference = rest[1..]
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| character(&rest[1..=end]).map(|c| (c, end + 2)));

        match reference {
            Some((c, length)) => {
                decoded.push(c);
                rest = &rest[length..];
            }
            None => {
                decoded.push('&');
                rest = &rest[1..];
            }
        }
    }

    decoded.push_str(rest);
    Cow::Owned(decoded)
}

fn character(reference: &str) -> Option<char> {
    match reference {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let number = reference.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
