//! Statement definition parser using nom.
//!
//! Definition files are a small XML subset: elements, attributes, character
//! data, CDATA sections, comments, processing instructions and the
//! predefined entities. The parser produces a generic attributed tree that
//! [`crate::ast`] turns into statement nodes.
//!
//! ```text
//! <mapper namespace="UserMapper">
//!     <select id="find">
//!         SELECT * FROM users WHERE 1 = 1
//!         <if expr="{name} != nil">AND name = {name}</if>   <- child, text
//!         ORDER BY id                                       <- tail of <if>
//!     </select>
//! </mapper>
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::{map, value},
    error::{Error, ErrorKind},
    multi::many0,
    sequence::{delimited, preceded, tuple},
    IResult,
};

use crate::error::{MapperError, MapperResult};

/// A parsed element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    /// Character data before the first child.
    pub text: String,
    /// Character data after this element's closing tag, up to the next
    /// sibling or the parent's closing tag.
    pub tail: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Parse a complete definition document into its root element.
pub fn parse_document(source_name: &str, input: &str) -> MapperResult<Element> {
    let result = tuple((misc, element, misc))(input);
    match result {
        Ok(("", (_, root, _))) => Ok(root),
        Ok((remaining, _)) => Err(MapperError::parse(
            source_name,
            line_of(input, remaining),
            format!("unexpected content after root element: '{}'", snippet(remaining)),
        )),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let message = match e.code {
                ErrorKind::Verify => "closing tag does not match opening tag".to_string(),
                _ if e.input.is_empty() => "unexpected end of input".to_string(),
                _ => format!("malformed markup near '{}'", snippet(e.input)),
            };
            Err(MapperError::parse(source_name, line_of(input, e.input), message))
        }
        Err(nom::Err::Incomplete(_)) => Err(MapperError::parse(
            source_name,
            line_of(input, ""),
            "unexpected end of input",
        )),
    }
}

fn line_of(input: &str, remaining: &str) -> usize {
    let offset = input.len().saturating_sub(remaining.len());
    input[..offset].matches('\n').count() + 1
}

fn snippet(input: &str) -> String {
    input.chars().take(24).collect()
}

/// Comments, processing instructions, doctype and whitespace around the root.
fn misc(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value((), comment),
            value((), processing_instruction),
            value((), doctype),
        ))),
    )(input)
}

fn comment(input: &str) -> IResult<&str, &str> {
    delimited(tag("<!--"), take_until("-->"), tag("-->"))(input)
}

fn processing_instruction(input: &str) -> IResult<&str, &str> {
    delimited(tag("<?"), take_until("?>"), tag("?>"))(input)
}

fn doctype(input: &str) -> IResult<&str, &str> {
    delimited(tag("<!DOCTYPE"), take_until(">"), char('>'))(input)
}

fn cdata(input: &str) -> IResult<&str, &str> {
    delimited(tag("<![CDATA["), take_until("]]>"), tag("]]>"))(input)
}

fn name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '.'))(input)
}

fn quoted(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('"'), take_while(|c| c != '"'), char('"')),
        delimited(char('\''), take_while(|c| c != '\''), char('\'')),
    ))(input)
}

/// Parse ` name="value"`.
fn attribute(input: &str) -> IResult<&str, (String, String)> {
    map(
        tuple((
            preceded(multispace1, name),
            delimited(multispace0, char('='), multispace0),
            quoted,
        )),
        |(key, _, raw)| (key.to_string(), decode_entities(raw)),
    )(input)
}

/// Parse an element and everything inside it.
fn element(input: &str) -> IResult<&str, Element> {
    let (input, _) = char('<')(input)?;
    let (input, open) = name(input)?;
    let (input, attributes) = many0(attribute)(input)?;
    let (input, _) = multispace0(input)?;

    let mut element = Element {
        tag: open.to_string(),
        attributes,
        ..Element::default()
    };

    if let Ok((input, _)) = tag::<_, _, Error<&str>>("/>")(input) {
        return Ok((input, element));
    }

    let (input, _) = char('>')(input)?;
    let (input, (text, children)) = content(input)?;
    let (after_slash, _) = tag("</")(input)?;
    let (rest, close) = name(after_slash)?;
    if close != open {
        return Err(nom::Err::Failure(Error::new(after_slash, ErrorKind::Verify)));
    }
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = char('>')(rest)?;

    element.text = text;
    element.children = children;
    Ok((rest, element))
}

/// Parse mixed content up to the closing tag. Character data before the
/// first child becomes the parent's text; data after a child becomes that
/// child's tail.
fn content(mut input: &str) -> IResult<&str, (String, Vec<Element>)> {
    let mut text = String::new();
    let mut children: Vec<Element> = Vec::new();

    while !input.is_empty() && !input.starts_with("</") {
        if let Ok((rest, _)) = comment(input) {
            input = rest;
            continue;
        }
        if let Ok((rest, _)) = processing_instruction(input) {
            input = rest;
            continue;
        }

        let target = match children.last_mut() {
            Some(child) => &mut child.tail,
            None => &mut text,
        };
        if let Ok((rest, data)) = cdata(input) {
            target.push_str(data);
            input = rest;
            continue;
        }
        if let Ok((rest, chunk)) = take_while1::<_, _, Error<&str>>(|c| c != '<')(input) {
            target.push_str(&decode_entities(chunk));
            input = rest;
            continue;
        }

        let (rest, child) = element(input)?;
        children.push(child);
        input = rest;
    }

    Ok((input, (text, children)))
}

/// Decode the predefined entities and numeric character references.
/// Unknown references are kept verbatim.
fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let decoded = candidate.find(';').and_then(|end| {
            let entity = &candidate[1..end];
            let ch = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &candidate[end + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
