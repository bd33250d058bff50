//! SQL subset parser using nom.
//!
//! Parses statements like:
//! - `SELECT host, count(*) AS hits FROM logs WHERE level = 'error' GROUP BY host LIMIT 10`
//! - `SELECT round(sum(bytes), 2) FROM metrics ORDER BY bytes DESC`
//! - `SHOW TABLES LIKE logs*`
//! - `SHOW COLUMNS IN logs`, `DESCRIBE logs`

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, tag_no_case, take_while1},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{map, opt, recognize, value},
    error::{Error as NomError, ErrorKind},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, preceded},
    IResult, Parser,
};
use regex::Regex;
use thiserror::Error;

/// Errors that can occur during SQL parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The statement syntax is invalid.
    #[error("Invalid SQL syntax: {0}")]
    SyntaxError(String),

    /// An unexpected token was encountered.
    #[error("Unexpected token: expected {expected}, found '{found}'")]
    UnexpectedToken {
        /// What was expected.
        expected: String,
        /// What was found.
        found: String,
    },

    /// The statement is empty.
    #[error("Empty query")]
    EmptyQuery,
}

/// A parsed SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlStatement {
    /// `SELECT ...`
    Select(SelectStatement),
    /// `SHOW TABLES [LIKE pattern]`
    ShowTables {
        /// The pattern, if given.
        like: Option<String>,
    },
    /// `SHOW COLUMNS IN table`; also produced by `DESCRIBE table`.
    ShowColumns {
        /// Table to describe.
        table: String,
    },
}

/// A parsed `SELECT`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStatement {
    /// Select list, in order.
    pub items: Vec<SelectItem>,
    /// `FROM` tables.
    pub tables: Vec<String>,
    /// `WHERE` expression.
    pub where_clause: Option<WhereExpr>,
    /// `GROUP BY` columns.
    pub group_by: Vec<String>,
    /// `ORDER BY` keys.
    pub order_by: Vec<OrderItem>,
    /// Raw `LIMIT` token.
    pub limit: Option<String>,
}

/// One entry of the select list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`
    Star,
    /// An expression with an optional `AS` alias.
    Expr {
        /// The expression.
        expr: SelectExpr,
        /// The alias.
        alias: Option<String>,
    },
}

/// A select-list expression.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectExpr {
    /// A column reference.
    Column(String),
    /// A number or quoted string, unquoted.
    Literal(String),
    /// A function call.
    Function(FunctionCall),
}

impl std::fmt::Display for SelectExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Column(name) | Self::Literal(name) => write!(f, "{name}"),
            Self::Function(call) => write!(f, "{call}"),
        }
    }
}

/// A function argument.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionArg {
    /// `*`, as in `count(*)`.
    Star,
    /// Any select expression.
    Expr(SelectExpr),
}

impl std::fmt::Display for FunctionArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Star => write!(f, "*"),
            Self::Expr(expr) => write!(f, "{expr}"),
        }
    }
}

/// A function call. The name is lower-cased.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// Function name.
    pub name: String,
    /// Arguments, in order.
    pub args: Vec<FunctionArg>,
}

impl FunctionCall {
    /// The arguments as they would be written, e.g. `x, 2`.
    #[must_use]
    pub fn arg_text(&self) -> String {
        self.args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.arg_text())
    }
}

/// Comparison operators in `WHERE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    /// `=`
    Eq,
    /// `!=` or `<>`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `LIKE`
    Like,
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlValue {
    /// The text, without quotes.
    pub text: String,
    /// Whether the value was quoted.
    pub quoted: bool,
}

/// `column op value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Column name.
    pub column: String,
    /// Operator.
    pub operator: ComparisonOp,
    /// Value.
    pub value: SqlValue,
}

/// A `WHERE` expression.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereExpr {
    /// A single comparison.
    Comparison(Comparison),
    /// Left AND right.
    And(Box<WhereExpr>, Box<WhereExpr>),
    /// Left OR right.
    Or(Box<WhereExpr>, Box<WhereExpr>),
    /// A parenthesized expression.
    Paren(Box<WhereExpr>),
}

/// One `ORDER BY` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    /// Column name.
    pub column: String,
    /// Ascending unless `DESC` is given.
    pub ascending: bool,
}

/// Parses one SQL statement.
///
/// Hyphenated bare identifiers such as `ind-0` are quoted first, and the
/// operand of `LIKE` is quoted as a string. `DESCRIBE t` is rewritten to
/// `SHOW COLUMNS IN t`.
///
/// # Errors
///
/// Returns a `ParseError` if:
/// - The statement is empty
/// - The syntax is invalid
/// - There is unexpected trailing content
///
/// # Examples
///
/// ```
/// use shared::query::{parse_statement, SqlStatement};
///
/// match parse_statement("SELECT * FROM ind-0 LIMIT 5").unwrap() {
///     SqlStatement::Select(select) => assert_eq!(select.tables, vec!["ind-0"]),
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
pub fn parse_statement(input: &str) -> Result<SqlStatement, ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseError::EmptyQuery);
    }

    let prepared = quote_like_operands(&quote_hyphenated(input)?)?;

    if let Ok((rest, table)) = describe(&prepared) {
        if rest.trim().trim_end_matches(';').is_empty() {
            tracing::debug!(table = %table, "Rewriting DESCRIBE as SHOW COLUMNS");
            return parse_statement(&format!("SHOW COLUMNS IN `{table}`"));
        }
    }

    match statement(&prepared) {
        Ok((remaining, statement)) => {
            let remaining = remaining.trim();
            if remaining.is_empty() {
                Ok(statement)
            } else {
                Err(ParseError::UnexpectedToken {
                    expected: "end of statement".to_string(),
                    found: remaining.to_string(),
                })
            }
        }
        Err(e) => Err(ParseError::SyntaxError(format!("{e}"))),
    }
}

// ============================================================================
// Pre-pass
// ============================================================================

/// Backtick-quotes bare hyphenated words that follow a space.
fn quote_hyphenated(input: &str) -> Result<String, ParseError> {
    let re = Regex::new(r"[\w`]+-[\w`]+").map_err(|e| ParseError::SyntaxError(e.to_string()))?;
    let mut out = String::with_capacity(input.len() + 8);
    let mut last = 0;
    for m in re.find_iter(input) {
        let preceded_by_space = input[..m.start()].ends_with(' ');
        let in_string = input[..m.start()].matches('\'').count() % 2 == 1;
        if !preceded_by_space || in_string || m.as_str().starts_with('`') {
            continue;
        }
        out.push_str(&input[last..m.start()]);
        out.push('`');
        out.push_str(m.as_str());
        out.push('`');
        last = m.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}

/// Single-quotes the token following `LIKE` unless it is already quoted.
fn quote_like_operands(input: &str) -> Result<String, ParseError> {
    let re = Regex::new(r"\b(LIKE|like) +([^\s'\x22;)]\S*)")
        .map_err(|e| ParseError::SyntaxError(e.to_string()))?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let operand = caps[2].replace('`', "");
            format!("{} '{operand}'", &caps[1])
        })
        .into_owned())
}

// ============================================================================
// Statements
// ============================================================================

fn statement(input: &str) -> IResult<&str, SqlStatement> {
    let (input, _) = multispace0(input)?;
    let (input, statement) =
        alt((map(select, SqlStatement::Select), show_tables, show_columns)).parse(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = opt(char(';')).parse(input)?;
    Ok((input, statement))
}

fn show_tables(input: &str) -> IResult<&str, SqlStatement> {
    let (input, _) = (keyword("SHOW"), multispace1, keyword("TABLES")).parse(input)?;
    let (input, like) =
        opt(preceded((multispace1, keyword("LIKE"), multispace1), sql_value)).parse(input)?;
    Ok((
        input,
        SqlStatement::ShowTables {
            like: like.map(|v| v.text),
        },
    ))
}

fn show_columns(input: &str) -> IResult<&str, SqlStatement> {
    let (input, _) = (
        keyword("SHOW"),
        multispace1,
        keyword("COLUMNS"),
        multispace1,
        alt((keyword("IN"), keyword("FROM"))),
        multispace1,
    )
        .parse(input)?;
    let (input, table) = table_name(input)?;
    Ok((input, SqlStatement::ShowColumns { table }))
}

fn describe(input: &str) -> IResult<&str, String> {
    let (input, _) = alt((keyword("DESCRIBE"), keyword("DESC"))).parse(input)?;
    let (input, _) = multispace1(input)?;
    table_name(input)
}

// ============================================================================
// SELECT
// ============================================================================

fn select(input: &str) -> IResult<&str, SelectStatement> {
    let (input, _) = keyword("SELECT").parse(input)?;
    let (input, _) = multispace1(input)?;
    let (input, items) = separated_list1(comma, select_item).parse(input)?;

    let (input, tables) = opt(preceded(
        (multispace1, keyword("FROM"), multispace1),
        separated_list1(comma, table_name),
    ))
    .parse(input)?;

    let (input, where_clause) =
        opt(preceded((multispace1, keyword("WHERE"), multispace1), or_expression)).parse(input)?;

    let (input, group_by) = opt(preceded(
        (multispace1, keyword("GROUP"), multispace1, keyword("BY"), multispace1),
        separated_list1(comma, identifier),
    ))
    .parse(input)?;

    let (input, order_by) = opt(preceded(
        (multispace1, keyword("ORDER"), multispace1, keyword("BY"), multispace1),
        separated_list1(comma, order_item),
    ))
    .parse(input)?;

    let (input, limit) = opt(preceded(
        (multispace1, keyword("LIMIT"), multispace1),
        take_while1(|c: char| !c.is_whitespace() && c != ';'),
    ))
    .parse(input)?;

    Ok((
        input,
        SelectStatement {
            items,
            tables: tables.unwrap_or_default(),
            where_clause,
            group_by: group_by.unwrap_or_default(),
            order_by: order_by.unwrap_or_default(),
            limit: limit.map(str::to_string),
        },
    ))
}

fn select_item(input: &str) -> IResult<&str, SelectItem> {
    alt((
        value(SelectItem::Star, char('*')),
        map(
            (
                select_expr,
                opt(preceded((multispace1, keyword("AS"), multispace1), identifier)),
            ),
            |(expr, alias)| SelectItem::Expr { expr, alias },
        ),
    ))
    .parse(input)
}

fn select_expr(input: &str) -> IResult<&str, SelectExpr> {
    alt((
        map(function_call, SelectExpr::Function),
        map(literal, SelectExpr::Literal),
        map(identifier, SelectExpr::Column),
    ))
    .parse(input)
}

fn function_call(input: &str) -> IResult<&str, FunctionCall> {
    let (input, name) = take_while1(|c: char| c.is_alphanumeric() || c == '_').parse(input)?;
    let (input, _) = (multispace0, char('('), multispace0).parse(input)?;
    let (input, args) = alt((
        value(vec![FunctionArg::Star], char('*')),
        separated_list0(comma, map(select_expr, FunctionArg::Expr)),
    ))
    .parse(input)?;
    let (input, _) = (multispace0, char(')')).parse(input)?;
    Ok((
        input,
        FunctionCall {
            name: name.to_ascii_lowercase(),
            args,
        },
    ))
}

fn literal(input: &str) -> IResult<&str, String> {
    alt((
        map(quoted('\''), str::to_string),
        map(quoted('"'), str::to_string),
        map(
            recognize((opt(char('-')), digit1, opt((char('.'), digit1)))),
            str::to_string,
        ),
    ))
    .parse(input)
}

fn table_name(input: &str) -> IResult<&str, String> {
    alt((map(char('*'), |_| "*".to_string()), identifier)).parse(input)
}

fn order_item(input: &str) -> IResult<&str, OrderItem> {
    let (input, column) = identifier(input)?;
    let (input, ascending) = opt(preceded(
        multispace1,
        alt((value(true, keyword("ASC")), value(false, keyword("DESC")))),
    ))
    .parse(input)?;
    Ok((
        input,
        OrderItem {
            column,
            ascending: ascending.unwrap_or(true),
        },
    ))
}

// ============================================================================
// WHERE
// ============================================================================

fn or_expression(input: &str) -> IResult<&str, WhereExpr> {
    let (input, first) = and_expression(input)?;
    let (input, rest) = many0(preceded(
        (multispace1, keyword("OR"), multispace1),
        and_expression,
    ))
    .parse(input)?;
    let expr = rest
        .into_iter()
        .fold(first, |left, right| WhereExpr::Or(Box::new(left), Box::new(right)));
    Ok((input, expr))
}

fn and_expression(input: &str) -> IResult<&str, WhereExpr> {
    let (input, first) = primary(input)?;
    let (input, rest) = many0(preceded(
        (multispace1, keyword("AND"), multispace1),
        primary,
    ))
    .parse(input)?;
    let expr = rest
        .into_iter()
        .fold(first, |left, right| WhereExpr::And(Box::new(left), Box::new(right)));
    Ok((input, expr))
}

fn primary(input: &str) -> IResult<&str, WhereExpr> {
    alt((
        map(
            delimited((char('('), multispace0), or_expression, (multispace0, char(')'))),
            |expr| WhereExpr::Paren(Box::new(expr)),
        ),
        map(comparison, WhereExpr::Comparison),
    ))
    .parse(input)
}

fn comparison(input: &str) -> IResult<&str, Comparison> {
    let (input, column) = identifier(input)?;
    let (input, _) = multispace0(input)?;
    let (input, operator) = comparison_op(input)?;
    let (input, _) = multispace0(input)?;
    let (input, value) = sql_value(input)?;
    Ok((
        input,
        Comparison {
            column,
            operator,
            value,
        },
    ))
}

fn comparison_op(input: &str) -> IResult<&str, ComparisonOp> {
    alt((
        value(ComparisonOp::NotEq, alt((tag("!="), tag("<>")))),
        value(ComparisonOp::LtEq, tag("<=")),
        value(ComparisonOp::GtEq, tag(">=")),
        value(ComparisonOp::Eq, tag("=")),
        value(ComparisonOp::Lt, tag("<")),
        value(ComparisonOp::Gt, tag(">")),
        value(ComparisonOp::Like, keyword("LIKE")),
    ))
    .parse(input)
}

fn sql_value(input: &str) -> IResult<&str, SqlValue> {
    alt((
        map(alt((quoted('\''), quoted('"'))), |text| SqlValue {
            text: text.to_string(),
            quoted: true,
        }),
        map(
            take_while1(|c: char| !c.is_whitespace() && c != ')' && c != ',' && c != ';'),
            |text: &str| SqlValue {
                text: text.to_string(),
                quoted: false,
            },
        ),
    ))
    .parse(input)
}

// ============================================================================
// Tokens
// ============================================================================

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '$')
}

/// A bare or backtick-quoted identifier, without the backticks.
fn identifier(input: &str) -> IResult<&str, String> {
    alt((
        map(delimited(char('`'), is_not("`"), char('`')), str::to_string),
        map(take_while1(is_identifier_char), str::to_string),
    ))
    .parse(input)
}

/// A case-insensitive keyword not followed by an identifier character.
fn keyword<'a>(word: &'static str) -> impl Fn(&'a str) -> IResult<&'a str, &'a str> {
    move |input: &'a str| {
        let (rest, matched) = tag_no_case(word).parse(input)?;
        if rest.starts_with(is_identifier_char) {
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
        }
        Ok((rest, matched))
    }
}

/// Text between two `delim` characters, possibly empty.
fn quoted<'a>(delim: char) -> impl Fn(&'a str) -> IResult<&'a str, &'a str> {
    move |input: &'a str| {
        let (input, _) = char(delim).parse(input)?;
        let end = input.find(delim).ok_or_else(|| {
            nom::Err::Error(NomError::new(input, ErrorKind::Char))
        })?;
        Ok((&input[end + delim.len_utf8()..], &input[..end]))
    }
}

fn comma(input: &str) -> IResult<&str, char> {
    delimited(multispace0, char(','), multispace0).parse(input)
}

// ============================================================================
// Tests
// ============================================================================
