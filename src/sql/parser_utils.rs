use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while1},
    character::complete::{alpha1, alphanumeric1, char, satisfy},
    combinator::{map, not, recognize},
    multi::many0,
    sequence::{delimited, terminated, tuple},
    IResult,
};

pub type SqlResult<'a, T> = IResult<&'a str, T, nom::error::Error<&'a str>>;

/// Standard SQL identifier (alpha/underscore followed by alnum/underscore).
pub fn ident(input: &str) -> SqlResult<&str> {
    recognize(tuple((
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    )))(input)
}

/// Double-quoted identifier; the quotes are stripped.
pub fn quoted_ident(input: &str) -> SqlResult<&str> {
    delimited(char('"'), take_while1(|c: char| c != '"'), char('"'))(input)
}

/// Plain or quoted identifier, as an owned name.
pub fn name(input: &str) -> SqlResult<String> {
    map(alt((quoted_ident, ident)), str::to_string)(input)
}

/// Case-insensitive keyword parser.
pub fn kw<'a>(keyword: &'static str) -> impl FnMut(&'a str) -> SqlResult<'a, &'a str> {
    tag_no_case(keyword)
}

/// Keyword that must not run into a following identifier character, so
/// `SAVEPOINT` does not match the start of `savepoint_1`.
pub fn kw_word<'a>(keyword: &'static str) -> impl FnMut(&'a str) -> SqlResult<'a, &'a str> {
    terminated(kw(keyword), not(satisfy(|c: char| c.is_alphanumeric() || c == '_')))
}
