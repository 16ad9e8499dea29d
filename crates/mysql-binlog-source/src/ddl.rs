//! Table extraction from DDL statements.

/// The `(schema, table)` a DDL statement changes, if it targets one table.
///
/// Recognizes `ALTER TABLE`, `CREATE TABLE`, `DROP TABLE`, `TRUNCATE` and
/// `RENAME TABLE`. Only the first table of a multi-table statement is
/// returned.
pub fn ddl_table(query: &str) -> Option<(Option<String>, String)> {
    let mut words = Words::new(query);
    let first = words.next()?.to_ascii_uppercase();
    match first.as_str() {
        "ALTER" => {
            let mut w = words.next()?.to_ascii_uppercase();
            while matches!(w.as_str(), "ONLINE" | "OFFLINE" | "IGNORE") {
                w = words.next()?.to_ascii_uppercase();
            }
            if w != "TABLE" {
                return None;
            }
        }
        "CREATE" => {
            let mut w = words.next()?.to_ascii_uppercase();
            if w == "TEMPORARY" {
                w = words.next()?.to_ascii_uppercase();
            }
            if w != "TABLE" {
                return None;
            }
            words.skip_if_not_exists();
        }
        "DROP" => {
            let mut w = words.next()?.to_ascii_uppercase();
            if w == "TEMPORARY" {
                w = words.next()?.to_ascii_uppercase();
            }
            if w != "TABLE" {
                return None;
            }
            words.skip_if_exists();
        }
        "TRUNCATE" | "RENAME" => {
            let w = words.next()?;
            if !w.eq_ignore_ascii_case("TABLE") {
                return if first == "TRUNCATE" { split_name(w) } else { None };
            }
        }
        _ => return None,
    }
    split_name(words.next()?)
}

fn split_name(raw: &str) -> Option<(Option<String>, String)> {
    let raw = raw.trim_end_matches([';', ',', '(']);
    let mut parts = raw.splitn(2, '.').map(unquote);
    let first = parts.next()?;
    match parts.next() {
        Some(table) if !table.is_empty() => Some((Some(first), table)),
        _ if !first.is_empty() => Some((None, first)),
        _ => None,
    }
}

fn unquote(s: &str) -> String {
    s.trim_matches('`').to_string()
}

struct Words<'a> {
    rest: &'a str,
}

impl<'a> Words<'a> {
    fn new(s: &'a str) -> Self {
        Self { rest: s }
    }

    fn peek_is(&self, word: &str) -> bool {
        let mut copy = Words { rest: self.rest };
        copy.next().is_some_and(|w| w.eq_ignore_ascii_case(word))
    }

    fn skip_if_exists(&mut self) {
        if self.peek_is("IF") {
            self.next();
            self.next();
        }
    }

    fn skip_if_not_exists(&mut self) {
        if self.peek_is("IF") {
            self.next();
            self.next();
            self.next();
        }
    }

    fn next(&mut self) -> Option<&'a str> {
        let s = self.rest.trim_start();
        if s.is_empty() {
            return None;
        }
        let mut end = s.len();
        let mut in_quote = false;
        for (i, c) in s.char_indices() {
            match c {
                '`' => in_quote = !in_quote,
                c if c.is_whitespace() && !in_quote => {
                    end = i;
                    break;
                }
                '(' if !in_quote && i > 0 => {
                    end = i;
                    break;
                }
                _ => {}
            }
        }
        let (word, rest) = s.split_at(end);
        self.rest = rest;
        Some(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(schema: Option<&str>, table: &str) -> Option<(Option<String>, String)> {
        Some((schema.map(str::to_string), table.to_string()))
    }

    #[test]
    fn test_alter_and_create() {
        assert_eq!(ddl_table("ALTER TABLE orders ADD COLUMN x INT"), t(None, "orders"));
        assert_eq!(ddl_table("alter table `shop`.`orders` drop x"), t(Some("shop"), "orders"));
        assert_eq!(
            ddl_table("CREATE TABLE IF NOT EXISTS shop.items(id INT)"),
            t(Some("shop"), "items")
        );
    }

    #[test]
    fn test_drop_truncate_rename() {
        assert_eq!(ddl_table("DROP TABLE IF EXISTS `a b`"), t(None, "a b"));
        assert_eq!(ddl_table("TRUNCATE TABLE logs;"), t(None, "logs"));
        assert_eq!(ddl_table("truncate logs"), t(None, "logs"));
        assert_eq!(ddl_table("RENAME TABLE old TO new"), t(None, "old"));
    }

    #[test]
    fn test_non_table_statements() {
        assert_eq!(ddl_table("BEGIN"), None);
        assert_eq!(ddl_table("CREATE DATABASE shop"), None);
        assert_eq!(ddl_table("CREATE INDEX i ON t(x)"), None);
        assert_eq!(ddl_table(""), None);
    }
}
