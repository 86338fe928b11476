//! Part 21 (ISO 10303-21) physical file parser.
//!
//! Only the DATA section is parsed. Header content is checked for the
//! `ISO-10303-21` marker by the caller and otherwise ignored.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while1},
    character::complete::{char, digit1, multispace0, multispace1, one_of},
    combinator::{map, map_res, opt, recognize, value},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

/// A STEP entity instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInstance {
    /// Entity ID (e.g., #123)
    pub id: u64,
    /// Entity type name (e.g., "CARTESIAN_POINT"). For complex instances
    /// this is the first partial type.
    pub type_name: String,
    /// Entity parameters. For complex instances, all partial parameter
    /// lists concatenated.
    pub params: Vec<StepValue>,
    /// Partial types of a complex instance `=( A(..) B(..) )`, in file order.
    /// Empty for simple instances.
    pub parts: Vec<(String, Vec<StepValue>)>,
}

impl EntityInstance {
    /// Parameters of one partial type of a complex instance.
    pub fn part(&self, type_name: &str) -> Option<&[StepValue]> {
        self.parts
            .iter()
            .find(|(t, _)| t == type_name)
            .map(|(_, p)| p.as_slice())
    }

    /// True for `=( ... )` complex instances.
    pub fn is_complex(&self) -> bool {
        !self.parts.is_empty()
    }
}

/// A STEP value in a parameter list.
#[derive(Debug, Clone, PartialEq)]
pub enum StepValue {
    /// Integer value
    Integer(i64),
    /// Real/float value
    Real(f64),
    /// String value
    String(String),
    /// Entity reference (#123)
    Reference(u64),
    /// Enumeration (.VALUE.)
    Enum(String),
    /// List of values
    List(Vec<StepValue>),
    /// Omitted/unset value ($)
    Omitted,
    /// Derived value (*)
    Derived,
    /// Typed value (TYPE(...))
    Typed { type_name: String, value: Box<StepValue> },
}

impl StepValue {
    /// Every entity reference inside this value, depth first.
    pub fn references(&self, out: &mut Vec<u64>) {
        match self {
            StepValue::Reference(r) => out.push(*r),
            StepValue::List(items) => items.iter().for_each(|v| v.references(out)),
            StepValue::Typed { value, .. } => value.references(out),
            _ => {}
        }
    }
}

/// Skip whitespace and `/* ... */` comments.
fn ws(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value((), tuple((tag("/*"), take_until("*/"), tag("*/")))),
        ))),
    )(input)
}

/// Parse a STEP entity ID (#123).
fn entity_id(input: &str) -> IResult<&str, u64> {
    preceded(char('#'), map_res(digit1, |s: &str| s.parse::<u64>()))(input)
}

/// Parse an integer.
fn integer(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(one_of("+-")), digit1)), |s: &str| {
        s.parse::<i64>()
    })(input)
}

/// Parse a real number. Integers are accepted and widened.
fn real(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize(tuple((
            opt(one_of("+-")),
            digit1,
            opt(pair(char('.'), opt(digit1))), // "0." has no trailing digits
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        ))),
        |s: &str| s.parse::<f64>(),
    )(input)
}

/// Parse an integer or a real, keeping integers exact.
fn number(input: &str) -> IResult<&str, StepValue> {
    let (rest, text) = recognize(real)(input)?;
    if text.contains(['.', 'e', 'E']) {
        map(real, StepValue::Real)(input)
    } else {
        let (_, i) = integer(text)?;
        Ok((rest, StepValue::Integer(i)))
    }
}

/// Parse a string literal with STEP escape sequence handling.
fn string_literal(input: &str) -> IResult<&str, String> {
    let (input, _) = char('\'')(input)?;
    let mut raw = String::new();
    let mut chars = input.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c == '\'' {
            if matches!(chars.peek(), Some((_, '\''))) {
                raw.push('\'');
                chars.next();
            } else {
                return Ok((&input[i + 1..], decode_step_string(&raw)));
            }
        } else {
            raw.push(c);
        }
    }

    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

/// Decode STEP escape sequences (`\X2\HHHH...\X0\` and `\X\HH`).
fn decode_step_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(pos) = rest.find('\\') {
        result.push_str(&rest[..pos]);
        rest = &rest[pos..];

        if let Some(body) = rest.strip_prefix("\\X2\\") {
            let end = body.find("\\X0\\").unwrap_or(body.len());
            let hex = &body[..end];
            let units: Vec<u16> = hex
                .as_bytes()
                .chunks(4)
                .filter_map(|c| std::str::from_utf8(c).ok())
                .filter_map(|c| u16::from_str_radix(c, 16).ok())
                .collect();
            result.extend(char::decode_utf16(units).filter_map(|c| c.ok()));
            rest = body.get(end + 4..).unwrap_or("");
        } else if let Some(body) = rest.strip_prefix("\\X\\") {
            match body.get(..2).and_then(|h| u8::from_str_radix(h, 16).ok()) {
                Some(byte) => {
                    result.push(byte as char);
                    rest = &body[2..];
                }
                None => {
                    result.push_str("\\X\\");
                    rest = body;
                }
            }
        } else {
            result.push('\\');
            rest = &rest[1..];
        }
    }

    result.push_str(rest);
    result
}

/// Parse an enumeration value.
fn enumeration(input: &str) -> IResult<&str, String> {
    delimited(
        char('.'),
        map(take_while1(|c: char| c.is_alphanumeric() || c == '_'), String::from),
        char('.'),
    )(input)
}

/// Parse a comma separated parameter list in parentheses.
fn parameter_list(input: &str) -> IResult<&str, Vec<StepValue>> {
    delimited(
        pair(char('('), ws),
        terminated(separated_list0(tuple((ws, char(','), ws)), step_value), ws),
        char(')'),
    )(input)
}

/// Parse a typed value: TYPE_NAME(value) or TYPE_NAME(val1, val2, ...).
fn typed_parameter(input: &str) -> IResult<&str, StepValue> {
    let (input, type_name) = take_while1(|c: char| c.is_ascii_uppercase() || c == '_')(input)?;
    let (input, _) = ws(input)?;
    let (input, mut values) = parameter_list(input)?;

    let inner_value = if values.len() == 1 {
        values.remove(0)
    } else {
        StepValue::List(values)
    };

    Ok((
        input,
        StepValue::Typed {
            type_name: type_name.to_string(),
            value: Box::new(inner_value),
        },
    ))
}

/// Parse a STEP value.
fn step_value(input: &str) -> IResult<&str, StepValue> {
    let (input, _) = ws(input)?;

    alt((
        value(StepValue::Omitted, char('$')),
        value(StepValue::Derived, char('*')),
        map(entity_id, StepValue::Reference),
        map(enumeration, StepValue::Enum),
        map(string_literal, StepValue::String),
        // Must come before numbers and lists
        typed_parameter,
        number,
        map(parameter_list, StepValue::List),
    ))(input)
}

/// Parse a single typed record (TYPE_NAME ( params )).
fn typed_record(input: &str) -> IResult<&str, (String, Vec<StepValue>)> {
    let (input, _) = ws(input)?;
    let (input, type_name) = take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)?;
    let (input, _) = ws(input)?;
    let (input, params) = parameter_list(input)?;
    Ok((input, (type_name.to_uppercase(), params)))
}

/// Parse an entity instance (simple or complex).
pub fn entity_instance(input: &str) -> IResult<&str, EntityInstance> {
    let (input, _) = ws(input)?;
    let (input, id) = entity_id(input)?;
    let (input, _) = tuple((ws, char('='), ws))(input)?;

    let (input, instance) = if input.starts_with('(') {
        let (input, parts) =
            delimited(pair(char('('), ws), many0(typed_record), pair(ws, char(')')))(input)?;

        let type_name = parts
            .first()
            .map(|(t, _)| t.clone())
            .unwrap_or_else(|| "COMPLEX".to_string());
        let params = parts.iter().flat_map(|(_, p)| p.iter().cloned()).collect();

        (
            input,
            EntityInstance {
                id,
                type_name,
                params,
                parts,
            },
        )
    } else {
        let (input, (type_name, params)) = typed_record(input)?;
        (
            input,
            EntityInstance {
                id,
                type_name,
                params,
                parts: Vec::new(),
            },
        )
    };

    let (input, _) = pair(ws, char(';'))(input)?;
    Ok((input, instance))
}

/// Parse the DATA section of a STEP file.
pub fn parse_data_section(input: &str) -> IResult<&str, Vec<EntityInstance>> {
    let (input, _) = take_until("DATA;")(input)?;
    let (input, _) = tag("DATA;")(input)?;
    let (input, _) = ws(input)?;

    let (input, entities) = many0(terminated(entity_instance, ws))(input)?;

    let (input, _) = tag("ENDSEC;")(input)?;
    let (input, _) = multispace0(input)?;

    Ok((input, entities))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id() {
        assert_eq!(entity_id("#4021"), Ok(("", 4021)));
        assert_eq!(entity_id("#7 "), Ok((" ", 7)));
        assert!(entity_id("#99999999999999999999999").is_err());
    }

    #[test]
    fn test_numbers() {
        assert!((real("25.4").unwrap().1 - 25.4).abs() < 1e-9);
        assert!((real("-2.5E+03").unwrap().1 + 2500.0).abs() < 1e-9);
        assert_eq!(number("0."), Ok(("", StepValue::Real(0.0))));
        assert_eq!(number("-42"), Ok(("", StepValue::Integer(-42))));
    }

    #[test]
    fn test_string_literal() {
        assert_eq!(string_literal("'bracket'"), Ok(("", "bracket".to_string())));
        assert_eq!(string_literal("'Part ''A'''"), Ok(("", "Part 'A'".to_string())));
        assert!(string_literal("'unterminated").is_err());
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(decode_step_string("\\X2\\00E9\\X0\\t\\X2\\00E9\\X0\\"), "été");
        assert_eq!(decode_step_string("caf\\X\\E9"), "café");
        assert_eq!(decode_step_string("a\\b"), "a\\b");
    }

    #[test]
    fn test_enumeration() {
        assert_eq!(enumeration(".F."), Ok(("", "F".to_string())));
        assert_eq!(enumeration(".UNSPECIFIED."), Ok(("", "UNSPECIFIED".to_string())));
    }

    #[test]
    fn test_entity_instance() {
        let (_, entity) = entity_instance("#31=ADVANCED_FACE('',(#32),#40,.T.);").unwrap();
        assert_eq!(entity.id, 31);
        assert_eq!(entity.type_name, "ADVANCED_FACE");
        assert_eq!(entity.params.len(), 4);
        assert_eq!(entity.params[3], StepValue::Enum("T".into()));
        assert!(!entity.is_complex());
    }

    #[test]
    fn test_crlf_line_endings() {
        let input = "DATA;\r\n#5 = VERTEX_POINT ( '', #6 ) ;\r\n#6 = CARTESIAN_POINT ( '',  ( 10.0, 0.0, -5.5 ) ) ;\r\nENDSEC;\r\n";
        let (_, entities) = parse_data_section(input).unwrap();
        assert_eq!(entities.iter().map(|e| e.id).collect::<Vec<_>>(), vec![5, 6]);
    }

    #[test]
    fn test_comments_between_entities() {
        let input = "DATA;\n/* a point */\n#1=CARTESIAN_POINT('',(1.,2.,3.));\n/* end */\nENDSEC;";
        let (_, entities) = parse_data_section(input).unwrap();
        assert_eq!(entities.len(), 1);
    }

    #[test]
    fn test_complex_entity() {
        let input = "DATA;\n#60=(LENGTH_UNIT()NAMED_UNIT(*)SI_UNIT(.MILLI.,.METRE.));\nENDSEC;";
        let (_, entities) = parse_data_section(input).unwrap();
        let unit = &entities[0];
        assert_eq!(unit.id, 60);
        assert!(unit.is_complex());
        assert_eq!(unit.part("SI_UNIT").map(|p| p.len()), Some(2));
        assert_eq!(unit.part("NAMED_UNIT"), Some(&[StepValue::Derived][..]));
        assert!(unit.part("PLANE_ANGLE_UNIT").is_none());
    }

    #[test]
    fn test_typed_parameter() {
        let input = "DATA;\n#70=UNCERTAINTY_MEASURE_WITH_UNIT(LENGTH_MEASURE(0.01),#60,'','');\nENDSEC;";
        let (_, entities) = parse_data_section(input).unwrap();
        match &entities[0].params[0] {
            StepValue::Typed { type_name, value } => {
                assert_eq!(type_name, "LENGTH_MEASURE");
                assert_eq!(**value, StepValue::Real(0.01));
            }
            other => panic!("expected a typed value, got {other:?}"),
        }
    }

    #[test]
    fn test_references_collects_nested() {
        let v = StepValue::List(vec![
            StepValue::Reference(1),
            StepValue::List(vec![StepValue::Reference(2), StepValue::Omitted]),
        ]);
        let mut refs = Vec::new();
        v.references(&mut refs);
        assert_eq!(refs, vec![1, 2]);
    }

    #[test]
    fn test_missing_endsec_fails() {
        assert!(parse_data_section("DATA;\n#1=CARTESIAN_POINT('',(0.,0.,0.));\n").is_err());
    }
}
