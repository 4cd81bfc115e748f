//! The query subset understood by the in-memory driver:
//!
//! `FOR v IN <collection | @@bind> [FILTER v.<path> == <@bind | literal>] [LIMIT n] RETURN v`

use serde_json::Value;

use crate::db::driver::BindVars;
use crate::db::error::{DatabaseError, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QueryPlan {
    pub collection: String,
    pub filter: Option<Filter>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Filter {
    pub path: Vec<String>,
    pub value: Value,
}

impl Filter {
    /// A missing attribute compares equal to `null`.
    pub fn matches(&self, document: &Value) -> bool {
        let mut current = document;
        for segment in &self.path {
            match current.get(segment) {
                Some(next) => current = next,
                None => return self.value.is_null(),
            }
        }
        *current == self.value
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
}

fn syntax(message: impl Into<String>) -> DatabaseError {
    DatabaseError::Query(message.into())
}

fn tokenize(query: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = query.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' || c == '\'' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some(escaped) => text.push(escaped),
                        None => return Err(syntax("unterminated string literal")),
                    },
                    Some(ch) if ch == c => break,
                    Some(ch) => text.push(ch),
                    None => return Err(syntax("unterminated string literal")),
                }
            }
            tokens.push(Token::Str(text));
        } else {
            let mut word = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                word.push(ch);
                chars.next();
            }
            tokens.push(Token::Word(word));
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: std::vec::IntoIter<Token>,
    bind_vars: &'a BindVars,
}

impl Parser<'_> {
    fn word(&mut self, what: &str) -> Result<String> {
        match self.tokens.next() {
            Some(Token::Word(word)) => Ok(word),
            Some(Token::Str(text)) => {
                Err(syntax(format!("expected {what}, found string '{text}'")))
            }
            None => Err(syntax(format!("expected {what}, found end of query"))),
        }
    }

    fn keyword(&mut self, keyword: &str) -> Result<()> {
        let word = self.word(keyword)?;
        if word.eq_ignore_ascii_case(keyword) {
            Ok(())
        } else {
            Err(syntax(format!("expected {keyword}, found '{word}'")))
        }
    }

    fn bind(&self, name: &str) -> Result<&Value> {
        self.bind_vars
            .get(name)
            .ok_or_else(|| syntax(format!("no value specified for bind parameter '{name}'")))
    }

    fn collection(&mut self) -> Result<String> {
        let source = self.word("collection")?;
        match source.strip_prefix("@@") {
            Some(name) => match self.bind(&format!("@{name}"))? {
                Value::String(collection) => Ok(collection.clone()),
                _ => Err(syntax(format!("collection parameter '@{name}' must be a string"))),
            },
            None => Ok(source),
        }
    }

    fn value(&mut self) -> Result<Value> {
        match self.tokens.next() {
            Some(Token::Str(text)) => Ok(Value::String(text)),
            Some(Token::Word(word)) => match word.strip_prefix('@') {
                Some(name) => self.bind(name).cloned(),
                None => serde_json::from_str(&word)
                    .map_err(|_| syntax(format!("unsupported literal '{word}'"))),
            },
            None => Err(syntax("expected value, found end of query")),
        }
    }

    fn filter(&mut self, variable: &str) -> Result<Filter> {
        let attribute = self.word("attribute")?;
        let mut segments = attribute.split('.');
        if segments.next() != Some(variable) {
            return Err(syntax(format!("FILTER must reference '{variable}'")));
        }
        let path: Vec<String> = segments.map(str::to_string).collect();
        if path.is_empty() || path.iter().any(String::is_empty) {
            return Err(syntax(format!("invalid attribute '{attribute}'")));
        }
        let operator = self.word("operator")?;
        if operator != "==" {
            return Err(syntax(format!("unsupported operator '{operator}'")));
        }
        Ok(Filter {
            path,
            value: self.value()?,
        })
    }

    fn limit(&mut self) -> Result<usize> {
        let count = self.word("limit")?;
        match count.strip_prefix('@') {
            Some(name) => self
                .bind(name)?
                .as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| syntax(format!("LIMIT parameter '{name}' must be a number"))),
            None => count
                .parse()
                .map_err(|_| syntax(format!("invalid LIMIT '{count}'"))),
        }
    }
}

pub(crate) fn parse(query: &str, bind_vars: &BindVars) -> Result<QueryPlan> {
    let mut parser = Parser {
        tokens: tokenize(query)?.into_iter(),
        bind_vars,
    };

    parser.keyword("FOR")?;
    let variable = parser.word("loop variable")?;
    parser.keyword("IN")?;
    let collection = parser.collection()?;

    let mut filter = None;
    let mut limit = None;
    loop {
        let clause = parser.word("RETURN")?;
        match clause.to_ascii_uppercase().as_str() {
            "FILTER" if filter.is_none() && limit.is_none() => {
                filter = Some(parser.filter(&variable)?)
            }
            "LIMIT" if limit.is_none() => limit = Some(parser.limit()?),
            "RETURN" => {
                let returned = parser.word("return value")?;
                if returned != variable {
                    return Err(syntax(format!("RETURN must return '{variable}'")));
                }
                if parser.tokens.next().is_some() {
                    return Err(syntax("unexpected input after RETURN"));
                }
                break;
            }
            _ => return Err(syntax(format!("unexpected '{clause}'"))),
        }
    }

    Ok(QueryPlan {
        collection,
        filter,
        limit,
    })
}
