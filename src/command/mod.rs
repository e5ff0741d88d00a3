//! Textual command parsing for the index driver
//!
//! One command per line: `insert <key> <s1> <s2> <n>`,
//! `delete <key> <s1> <s2> <n>`, `find <key>`. Fields are whitespace
//! separated; keys and strings are arbitrary non-blank tokens.

use chumsky::{prelude::*, regex::regex};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Insert {
        key: String,
        s1: String,
        s2: String,
        num: i32,
    },
    Delete {
        key: String,
        s1: String,
        s2: String,
        num: i32,
    },
    Find {
        key: String,
    },
}

pub fn parser<'a>() -> impl Parser<'a, &'a str, Command, extra::Err<Rich<'a, char>>> {
    let blank = one_of(" \t").repeated().at_least(1);
    let word = none_of(" \t")
        .repeated()
        .at_least(1)
        .to_slice()
        .map(|s: &str| s.to_string());
    let number = regex(r"-?\d+").map(|s: &str| s.parse::<i32>().unwrap());

    // <key> <s1> <s2> <n>
    let payload = blank
        .clone()
        .ignore_then(word.clone())
        .then_ignore(blank.clone())
        .then(word.clone())
        .then_ignore(blank.clone())
        .then(word.clone())
        .then_ignore(blank.clone())
        .then(number);

    let insert = just("insert")
        .ignore_then(payload.clone())
        .map(|(((key, s1), s2), num)| Command::Insert { key, s1, s2, num });

    let delete = just("delete")
        .ignore_then(payload)
        .map(|(((key, s1), s2), num)| Command::Delete { key, s1, s2, num });

    let find = just("find")
        .ignore_then(blank.ignore_then(word))
        .map(|key| Command::Find { key });

    choice((insert, delete, find)).padded().then_ignore(end())
}

pub fn parse(line: &str) -> Result<Command, String> {
    parser()
        .parse(line)
        .into_result()
        .map_err(|errs| format!("Parse errors: {:?}", errs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert() {
        assert_eq!(
            parse("insert k0001 e h 1"),
            Ok(Command::Insert {
                key: "k0001".into(),
                s1: "e".into(),
                s2: "h".into(),
                num: 1,
            })
        );
    }

    #[test]
    fn test_delete_negative_number() {
        assert_eq!(
            parse("delete some-key x y -42"),
            Ok(Command::Delete {
                key: "some-key".into(),
                s1: "x".into(),
                s2: "y".into(),
                num: -42,
            })
        );
    }

    #[test]
    fn test_find() {
        assert_eq!(
            parse("find k0500"),
            Ok(Command::Find {
                key: "k0500".into()
            })
        );
    }

    #[test]
    fn test_numeric_key() {
        assert_eq!(parse("find 123"), Ok(Command::Find { key: "123".into() }));
    }

    #[test]
    fn test_surrounding_whitespace() {
        assert_eq!(
            parse("  find abc  "),
            Ok(Command::Find { key: "abc".into() })
        );
    }

    #[test]
    fn test_keyword_needs_boundary() {
        assert!(parse("insertx a b c 1").is_err());
    }

    #[test]
    fn test_missing_fields() {
        assert!(parse("insert k e h").is_err());
        assert!(parse("find").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_unknown_command() {
        assert!(parse("upsert k e h 1").is_err());
    }

    #[test]
    fn test_trailing_garbage() {
        assert!(parse("find a b").is_err());
        assert!(parse("insert k e h 1 extra").is_err());
    }
}
