//! CSS rewriter.
//!
//! Walks the payload with the cssparser tokenizer and records the byte
//! ranges of `url(...)` tokens, quoted `url()` arguments and `@import`
//! targets, then splices rewritten URLs back into the original text. Nothing
//! outside a spliced range is touched, so byte order marks, `@charset`
//! declarations, vendor syntax and outright invalid rules all survive
//! verbatim.

use std::ops::Range;

use cssparser::{Parser, ParserInput, Token};
use url::Url;

use crate::url_rewriting::ArticleUrlRewriter;

pub struct CssRewriter<'a> {
    url_rewriter: &'a ArticleUrlRewriter<'a>,
}

struct Edit {
    range: Range<usize>,
    text: String,
}

impl<'a> CssRewriter<'a> {
    pub fn new(url_rewriter: &'a ArticleUrlRewriter<'a>) -> Self {
        Self { url_rewriter }
    }

    /// Rewrite a stylesheet or a bare declaration list (`style="…"` values
    /// go through the same tokenizer).
    pub fn rewrite(&self, content: &str, base: Option<&Url>) -> String {
        let (bom, body) = match content.strip_prefix('\u{feff}') {
            Some(rest) => ("\u{feff}", rest),
            None => ("", content),
        };

        let mut edits = Vec::new();
        {
            let mut input = ParserInput::new(body);
            let mut parser = Parser::new(&mut input);
            self.scan(&mut parser, base, &mut edits);
        }

        if edits.is_empty() {
            return content.to_string();
        }

        let mut out = String::with_capacity(content.len());
        out.push_str(bom);
        let mut cursor = 0;
        for edit in edits {
            if edit.range.start < cursor {
                continue;
            }
            out.push_str(&body[cursor..edit.range.start]);
            out.push_str(&edit.text);
            cursor = edit.range.end;
        }
        out.push_str(&body[cursor..]);
        out
    }

    fn scan<'i, 't>(
        &self,
        parser: &mut Parser<'i, 't>,
        base: Option<&Url>,
        edits: &mut Vec<Edit>,
    ) {
        let mut import_pending = false;
        loop {
            let start = parser.position();
            let token = match parser.next_including_whitespace_and_comments() {
                Ok(token) => token.clone(),
                Err(_) => break,
            };
            let end = parser.position();

            match token {
                Token::UnquotedUrl(value) => {
                    // The token spans the whole `url(...)` construct.
                    let rewritten = self.url_rewriter.rewrite(value.as_ref(), base);
                    if rewritten != value.as_ref() {
                        let mut text = String::from("url(");
                        cssparser::serialize_string(&rewritten, &mut text)
                            .expect("writing to String cannot fail");
                        text.push(')');
                        edits.push(Edit {
                            range: start.byte_index()..end.byte_index(),
                            text,
                        });
                    }
                    import_pending = false;
                }
                Token::QuotedString(value) if import_pending => {
                    let rewritten = self.url_rewriter.rewrite(value.as_ref(), base);
                    if rewritten != value.as_ref() {
                        let mut text = String::new();
                        cssparser::serialize_string(&rewritten, &mut text)
                            .expect("writing to String cannot fail");
                        edits.push(Edit {
                            range: start.byte_index()..end.byte_index(),
                            text,
                        });
                    }
                    import_pending = false;
                }
                Token::Function(name) if name.eq_ignore_ascii_case("url") => {
                    let _ = parser.parse_nested_block(|nested| {
                        loop {
                            let arg_start = nested.position();
                            match nested.next_including_whitespace_and_comments() {
                                Ok(Token::WhiteSpace(_)) | Ok(Token::Comment(_)) => continue,
                                Ok(Token::QuotedString(value)) => {
                                    let value = value.clone();
                                    let arg_end = nested.position();
                                    let rewritten =
                                        self.url_rewriter.rewrite(value.as_ref(), base);
                                    if rewritten != value.as_ref() {
                                        let mut text = String::new();
                                        cssparser::serialize_string(&rewritten, &mut text)
                                            .expect("writing to String cannot fail");
                                        edits.push(Edit {
                                            range: arg_start.byte_index()..arg_end.byte_index(),
                                            text,
                                        });
                                    }
                                    break;
                                }
                                _ => break,
                            }
                        }
                        Ok::<_, cssparser::ParseError<'i, ()>>(())
                    });
                    import_pending = false;
                }
                Token::AtKeyword(name) if name.eq_ignore_ascii_case("import") => {
                    import_pending = true;
                }
                Token::Function(_)
                | Token::ParenthesisBlock
                | Token::SquareBracketBlock
                | Token::CurlyBracketBlock => {
                    let _ = parser.parse_nested_block(|nested| {
                        self.scan(nested, base, edits);
                        Ok::<_, cssparser::ParseError<'i, ()>>(())
                    });
                    import_pending = false;
                }
                Token::WhiteSpace(_) | Token::Comment(_) => {}
                Token::Semicolon => {
                    import_pending = false;
                }
                _ => {
                    import_pending = false;
                }
            }
        }
    }
}
