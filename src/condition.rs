//! MSBuild `Condition` attributes as they appear on `.dproj` property groups
//! and on individual properties.
//!
//! Conditions are evaluated while they are parsed: the grammar is built
//! around the property map in force at that point, so each quoted operand
//! is expanded on the spot and every rule yields a `bool`. Only the subset
//! RAD Studio writes is understood:
//!
//! ```text
//! expr    = all ('or' all)*
//! all     = unary ('and' unary)*
//! unary   = '!'? atom
//! atom    = compare | exists | '(' expr ')'
//! compare = operand ('==' | '!=') operand
//! exists  = 'Exists' '(' operand ')'
//! operand = "'" chars "'"
//! ```
//!
//! Keywords and string comparisons ignore case, like MSBuild itself.
//! `Exists(...)` never touches the filesystem and always holds.

use chumsky::prelude::*;
use std::collections::HashMap;

/// A condition outside the supported subset.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to parse condition '{input}': {reason}")]
pub struct ConditionError {
    pub input: String,
    pub reason: String,
}

/// Expand `$(Name)` references in a quoted operand. Unknown names and an
/// unterminated reference expand to nothing.
fn expand_operand(raw: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("$(") {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        let Some(end) = tail.find(')') else {
            return out;
        };
        if let Some(value) = vars.get(&tail[..end]) {
            out.push_str(value);
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    out
}

fn evaluator<'a>(
    vars: &'a HashMap<String, String>,
) -> impl Parser<'a, &'a str, bool, extra::Err<Simple<'a, char>>> {
    recursive(move |expr| {
        let operand = just('\'')
            .ignore_then(none_of('\'').repeated().to_slice())
            .then_ignore(just('\''))
            .map(move |raw: &str| expand_operand(raw, vars))
            .padded();

        let equal = just("==").to(true).or(just("!=").to(false)).padded();

        let compare = operand
            .clone()
            .then(equal)
            .then(operand.clone())
            .map(|((lhs, want_equal), rhs)| lhs.eq_ignore_ascii_case(&rhs) == want_equal);

        let keyword = |name: &'static str| {
            any()
                .filter(|c: &char| c.is_ascii_alphabetic())
                .repeated()
                .at_least(1)
                .to_slice()
                .filter(move |word: &&str| word.eq_ignore_ascii_case(name))
                .padded()
        };

        let exists = keyword("exists")
            .ignore_then(operand.delimited_by(just('(').padded(), just(')').padded()))
            .to(true);

        let group = expr.delimited_by(just('(').padded(), just(')').padded());

        let unary = just('!')
            .padded()
            .or_not()
            .then(choice((compare, exists, group)))
            .map(|(negate, value)| value != negate.is_some());

        let all = unary
            .clone()
            .foldl(keyword("and").ignore_then(unary).repeated(), |a, b| a && b);

        all.clone()
            .foldl(keyword("or").ignore_then(all).repeated(), |a, b| a || b)
    })
}

/// Evaluate `input` against a property map.
///
/// ```
/// use std::collections::HashMap;
/// use vsdelphi::condition::evaluate;
///
/// let vars = HashMap::from([("Config".to_string(), "Debug".to_string())]);
/// assert!(evaluate("'$(Config)'=='debug' or '$(Cfg_1)'!=''", &vars).unwrap());
/// ```
pub fn evaluate(input: &str, vars: &HashMap<String, String>) -> Result<bool, ConditionError> {
    evaluator(vars)
        .parse(input)
        .into_result()
        .map_err(|errs| ConditionError {
            input: input.to_string(),
            reason: errs
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn operands_expand_known_names_only() {
        let vars = vars(&[("BDS", r"C:\Studio"), ("Platform", "Win64")]);
        assert_eq!(
            expand_operand(r"$(BDS)\lib\$(Platform)\$(Nope)", &vars),
            r"C:\Studio\lib\Win64\"
        );
        assert_eq!(expand_operand("a$(unterminated", &vars), "a");
    }

    #[test]
    fn empty_check_with_spaces() {
        assert!(evaluate(" '$(Configuration)' == '' ", &HashMap::new()).unwrap());
        assert!(!evaluate("'$(Configuration)'==''", &vars(&[("Configuration", "Debug")])).unwrap());
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let cond = "'$(Platform)'=='Win64' and '$(Cfg_1)'=='true' or '$(Base)'!=''";
        assert!(evaluate(cond, &vars(&[("Base", "true")])).unwrap());
        assert!(evaluate(cond, &vars(&[("Platform", "Win64"), ("Cfg_1", "true")])).unwrap());
        assert!(!evaluate(cond, &vars(&[("Platform", "Win64")])).unwrap());
    }

    #[test]
    fn parentheses_override_precedence() {
        let cond = "'$(Platform)'=='Win64' and ('$(Cfg_1)'=='true' or '$(Base)'!='')";
        assert!(!evaluate(cond, &vars(&[("Base", "true")])).unwrap());
        assert!(evaluate(cond, &vars(&[("Platform", "Win64"), ("Base", "true")])).unwrap());
    }

    #[test]
    fn evaluates_config_selectors() {
        let cond = "'$(Config)'=='Debug' or '$(Cfg_1)'!=''";
        assert!(evaluate(cond, &vars(&[("Config", "Debug")])).unwrap());
        assert!(evaluate(cond, &vars(&[("Config", "Base"), ("Cfg_1", "true")])).unwrap());
        assert!(!evaluate(cond, &vars(&[("Config", "Release")])).unwrap());
    }

    #[test]
    fn comparison_and_keywords_ignore_case() {
        let cond = "'$(Platform)'=='win32' And '$(Base)'=='TRUE'";
        assert!(evaluate(cond, &vars(&[("Platform", "Win32"), ("Base", "true")])).unwrap());
    }

    #[test]
    fn negation() {
        assert!(evaluate("!('$(Base)'=='true')", &HashMap::new()).unwrap());
        assert!(!evaluate("! '$(Base)'==''", &HashMap::new()).unwrap());
    }

    #[test]
    fn exists_always_holds() {
        let cond = r"Exists('$(BDS)\Bin\CodeGear.Delphi.Targets')";
        assert!(evaluate(cond, &HashMap::new()).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        let err = evaluate("'$(Config)' ~ 'Debug'", &HashMap::new()).unwrap_err();
        assert_eq!(err.input, "'$(Config)' ~ 'Debug'");
        assert!(evaluate("'a'=='a' xor 'b'=='b'", &HashMap::new()).is_err());
    }
}
