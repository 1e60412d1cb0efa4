//! Row filter expressions.
//!
//! A small R-flavoured boolean language evaluated once per row:
//!
//! ```text
//! price > 1000 & (cut == "Ideal" | cut %in% c("Premium", "Very Good")) & !flag
//! ```
//!
//! Comparisons involving a missing cell are undefined and an undefined
//! row is excluded, the way `dplyr::filter` drops `NA`.

use crate::dataset::{parse_date, ColumnData, DataSet};
use crate::error::{HclusError, Result};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Num(f64),
    Str(String),
    Bool(bool),
    Column(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    In(Box<Expr>, Vec<Expr>),
}

/// A cell or literal during evaluation.
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Num(f64),
    /// Days since the epoch, compared against date strings by parsing them.
    Date(f64),
    Str(String),
    Bool(bool),
    Na,
}

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFilter {
    source: String,
    expr: Expr,
}

impl RowFilter {
    pub fn parse(source: &str) -> Result<Self> {
        let mut parser = Parser::from_source(source);
        let expr = parser.parse_all()?;
        Ok(Self {
            source: source.trim().to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Every column the expression refers to.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_columns(&self.expr, &mut out);
        out
    }

    /// Row mask for `ds`: `true` where the expression holds.
    pub fn evaluate(&self, ds: &DataSet) -> Result<Vec<bool>> {
        for name in self.columns() {
            ds.require(name)?;
        }
        (0..ds.nrows())
            .map(|row| match eval(&self.expr, ds, row)? {
                Value::Bool(b) => Ok(b),
                Value::Na => Ok(false),
                other => Err(filter_error(format!(
                    "expression must be logical, found {}",
                    describe(&other)
                ))),
            })
            .collect()
    }
}

fn filter_error(message: impl Into<String>) -> HclusError {
    HclusError::Filter {
        message: message.into(),
    }
}

fn collect_columns<'a>(expr: &'a Expr, out: &mut Vec<&'a str>) {
    match expr {
        Expr::Column(name) => {
            if !out.contains(&name.as_str()) {
                out.push(name);
            }
        }
        Expr::Not(e) => collect_columns(e, out),
        Expr::And(a, b) | Expr::Or(a, b) | Expr::Cmp(_, a, b) => {
            collect_columns(a, out);
            collect_columns(b, out);
        }
        Expr::In(e, list) => {
            collect_columns(e, out);
            for item in list {
                collect_columns(item, out);
            }
        }
        Expr::Num(_) | Expr::Str(_) | Expr::Bool(_) => {}
    }
}

fn describe(v: &Value) -> &'static str {
    match v {
        Value::Num(_) => "a number",
        Value::Date(_) => "a date",
        Value::Str(_) => "a string",
        Value::Bool(_) => "a logical",
        Value::Na => "NA",
    }
}

fn cell(ds: &DataSet, name: &str, row: usize) -> Result<Value> {
    let column = ds.require(name)?;
    if column.data.is_missing(row) {
        return Ok(Value::Na);
    }
    Ok(match &column.data {
        ColumnData::Numeric(_) => column.data.as_f64(row).map_or(Value::Na, Value::Num),
        ColumnData::Date(_) => column.data.as_f64(row).map_or(Value::Na, Value::Date),
        ColumnData::Logical(v) => v[row].map_or(Value::Na, Value::Bool),
        ColumnData::Factor { .. } => Value::Str(column.data.display(row)),
    })
}

fn truth(v: Value) -> Result<Option<bool>> {
    match v {
        Value::Bool(b) => Ok(Some(b)),
        Value::Na => Ok(None),
        other => Err(filter_error(format!(
            "logical operator applied to {}",
            describe(&other)
        ))),
    }
}

fn from_truth(b: Option<bool>) -> Value {
    b.map_or(Value::Na, Value::Bool)
}

fn eval(expr: &Expr, ds: &DataSet, row: usize) -> Result<Value> {
    Ok(match expr {
        Expr::Num(x) => Value::Num(*x),
        Expr::Str(s) => Value::Str(s.clone()),
        Expr::Bool(b) => Value::Bool(*b),
        Expr::Column(name) => cell(ds, name, row)?,
        Expr::Not(e) => from_truth(truth(eval(e, ds, row)?)?.map(|b| !b)),
        Expr::And(a, b) => {
            let a = truth(eval(a, ds, row)?)?;
            if a == Some(false) {
                return Ok(Value::Bool(false));
            }
            match (a, truth(eval(b, ds, row)?)?) {
                (_, Some(false)) => Value::Bool(false),
                (Some(true), Some(true)) => Value::Bool(true),
                _ => Value::Na,
            }
        }
        Expr::Or(a, b) => {
            let a = truth(eval(a, ds, row)?)?;
            if a == Some(true) {
                return Ok(Value::Bool(true));
            }
            match (a, truth(eval(b, ds, row)?)?) {
                (_, Some(true)) => Value::Bool(true),
                (Some(false), Some(false)) => Value::Bool(false),
                _ => Value::Na,
            }
        }
        Expr::Cmp(op, a, b) => {
            let a = eval(a, ds, row)?;
            let b = eval(b, ds, row)?;
            match compare(&a, &b)? {
                None => Value::Na,
                Some(ord) => Value::Bool(match op {
                    CmpOp::Eq => ord == Ordering::Equal,
                    CmpOp::Ne => ord != Ordering::Equal,
                    CmpOp::Lt => ord == Ordering::Less,
                    CmpOp::Le => ord != Ordering::Greater,
                    CmpOp::Gt => ord == Ordering::Greater,
                    CmpOp::Ge => ord != Ordering::Less,
                }),
            }
        }
        Expr::In(e, list) => {
            let v = eval(e, ds, row)?;
            if v == Value::Na {
                return Ok(Value::Bool(false));
            }
            for item in list {
                let item = eval(item, ds, row)?;
                if compare(&v, &item)? == Some(Ordering::Equal) {
                    return Ok(Value::Bool(true));
                }
            }
            Value::Bool(false)
        }
    })
}

fn date_literal(s: &str) -> Result<f64> {
    parse_date(s)
        .map(crate::dataset::days_since_epoch)
        .ok_or_else(|| filter_error(format!("'{s}' is not a date (expected YYYY-MM-DD)")))
}

/// Order two values, `None` when either is missing.
fn compare(a: &Value, b: &Value) -> Result<Option<Ordering>> {
    use Value::*;
    let pair = match (a, b) {
        (Na, _) | (_, Na) => return Ok(None),
        (Num(x), Num(y)) | (Date(x), Date(y)) | (Date(x), Num(y)) | (Num(x), Date(y)) => (*x, *y),
        (Date(x), Str(s)) => (*x, date_literal(s)?),
        (Str(s), Date(y)) => (date_literal(s)?, *y),
        (Bool(x), Bool(y)) => return Ok(Some(x.cmp(y))),
        (Bool(x), Num(y)) => (f64::from(u8::from(*x)), *y),
        (Num(x), Bool(y)) => (*x, f64::from(u8::from(*y))),
        (Str(x), Str(y)) => return Ok(Some(x.cmp(y))),
        (Str(x), Num(y)) => return Ok(Some(x.as_str().cmp(format_num(*y).as_str()))),
        (Num(x), Str(y)) => return Ok(Some(format_num(*x).as_str().cmp(y.as_str()))),
        (x, y) => {
            return Err(filter_error(format!(
                "cannot compare {} with {}",
                describe(x),
                describe(y)
            )))
        }
    };
    Ok(pair.0.partial_cmp(&pair.1))
}

fn format_num(x: f64) -> String {
    format!("{x}")
}

struct Parser {
    src: Vec<char>,
    pos: usize,
}

impl Parser {
    fn from_source(source: &str) -> Self {
        Self {
            src: source.chars().collect(),
            pos: 0,
        }
    }

    fn peekc(&self) -> Option<char> {
        self.src.get(self.pos).cloned()
    }

    fn nextc(&mut self) -> Option<char> {
        let c = self.peekc();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn starts_with(&self, s: &str) -> bool {
        let n = s.chars().count();
        self.pos + n <= self.src.len() && self.src[self.pos..].iter().zip(s.chars()).all(|(a, b)| *a == b)
    }

    fn eat_str(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            self.pos += s.chars().count();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peekc(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn error(&self, what: &str) -> HclusError {
        filter_error(format!("{what} at position {}", self.pos))
    }

    fn parse_all(&mut self) -> Result<Expr> {
        self.skip_ws();
        if self.peekc().is_none() {
            return Err(filter_error("empty expression"));
        }
        let expr = self.parse_or()?;
        self.skip_ws();
        if self.peekc().is_some() {
            return Err(self.error("unexpected input"));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        loop {
            self.skip_ws();
            if self.eat_str("||") || self.eat_str("|") {
                let rhs = self.parse_and()?;
                lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_not()?;
        loop {
            self.skip_ws();
            if self.eat_str("&&") || self.eat_str("&") {
                let rhs = self.parse_not()?;
                lhs = Expr::And(Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_not(&mut self) -> Result<Expr> {
        self.skip_ws();
        if self.peekc() == Some('!') && !self.starts_with("!=") {
            self.nextc();
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let lhs = self.parse_atom()?;
        self.skip_ws();
        if self.eat_str("%in%") {
            self.skip_ws();
            let list = self.parse_list()?;
            return Ok(Expr::In(Box::new(lhs), list));
        }
        let op = if self.eat_str("==") {
            CmpOp::Eq
        } else if self.eat_str("!=") {
            CmpOp::Ne
        } else if self.eat_str("<=") {
            CmpOp::Le
        } else if self.eat_str(">=") {
            CmpOp::Ge
        } else if self.eat_str("<") {
            CmpOp::Lt
        } else if self.eat_str(">") {
            CmpOp::Gt
        } else {
            return Ok(lhs);
        };
        let rhs = self.parse_atom()?;
        Ok(Expr::Cmp(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_list(&mut self) -> Result<Vec<Expr>> {
        if !self.eat_str("c(") {
            return Ok(vec![self.parse_atom()?]);
        }
        let mut items = Vec::new();
        self.skip_ws();
        if self.eat_str(")") {
            return Ok(items);
        }
        loop {
            items.push(self.parse_atom()?);
            self.skip_ws();
            match self.nextc() {
                Some(',') => continue,
                Some(')') => return Ok(items),
                _ => return Err(self.error("expected ',' or ')' in c(...)")),
            }
        }
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        self.skip_ws();
        match self.peekc() {
            Some('(') => {
                self.nextc();
                let e = self.parse_or()?;
                self.skip_ws();
                if self.nextc() != Some(')') {
                    return Err(self.error("expected ')'"));
                }
                Ok(e)
            }
            Some('"') | Some('\'') => self.parse_string(),
            Some('`') => {
                self.nextc();
                let start = self.pos;
                while matches!(self.peekc(), Some(c) if c != '`') {
                    self.pos += 1;
                }
                let name: String = self.src[start..self.pos].iter().collect();
                if self.nextc() != Some('`') {
                    return Err(self.error("unterminated backtick name"));
                }
                Ok(Expr::Column(name))
            }
            Some(c) if c.is_ascii_digit() || c == '.' || c == '-' => self.parse_number(),
            Some(c) if is_ident_start(c) => Ok(self.parse_symbol()),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn parse_string(&mut self) -> Result<Expr> {
        let quote = self.nextc();
        let mut out = String::new();
        loop {
            match self.nextc() {
                Some('\\') => match self.nextc() {
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) if Some(c) == quote => return Ok(Expr::Str(out)),
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn parse_number(&mut self) -> Result<Expr> {
        let start = self.pos;
        if self.peekc() == Some('-') {
            self.pos += 1;
        }
        while matches!(self.peekc(), Some(c) if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E') {
            self.pos += 1;
        }
        let text: String = self.src[start..self.pos].iter().collect();
        text.parse::<f64>()
            .map(Expr::Num)
            .map_err(|_| self.error(&format!("invalid number '{text}'")))
    }

    fn parse_symbol(&mut self) -> Expr {
        let start = self.pos;
        while matches!(self.peekc(), Some(c) if is_ident_continue(c)) {
            self.pos += 1;
        }
        let name: String = self.src[start..self.pos].iter().collect();
        match name.as_str() {
            "TRUE" | "T" => Expr::Bool(true),
            "FALSE" | "F" => Expr::Bool(false),
            _ => Expr::Column(name),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}
