//! Yes/no questions on the terminal.

use std::io::{self, BufRead, Write};

/// Ask `question` on stdout and read the answer from stdin.
pub fn confirm(question: &str, default: Option<bool>) -> io::Result<bool> {
    confirm_with(&mut io::stdin().lock(), &mut io::stdout(), question, default)
}

/// Keep asking until the answer is yes, no, or empty with a default.
///
/// End of input counts as "no".
pub fn confirm_with(
    input: &mut dyn BufRead,
    output: &mut dyn Write,
    question: &str,
    default: Option<bool>,
) -> io::Result<bool> {
    let hint = match default {
        Some(true) => "(Y/n)",
        Some(false) | None => "(y/N)",
    };
    let mut answer = String::new();
    loop {
        answer.clear();
        write!(output, "{question} {hint}: ")?;
        output.flush()?;
        if input.read_line(&mut answer)? == 0 {
            writeln!(output)?;
            return Ok(false);
        }
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            "" => {
                if let Some(default) = default {
                    return Ok(default);
                }
            },
            _ => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Cursor;

    #[rstest]
    #[case("y\n", None, true)]
    #[case("YES\n", None, true)]
    #[case("n\n", Some(true), false)]
    #[case("\n", Some(true), true)]
    #[case("maybe\n\ny\n", None, true)]
    #[case("", Some(true), false)]
    fn test_confirm(#[case] input: &str, #[case] default: Option<bool>, #[case] expected: bool) {
        let mut output = Vec::new();
        let answer = confirm_with(&mut Cursor::new(input), &mut output, "Confirm upload?", default).unwrap();
        assert_eq!(answer, expected);
        assert!(String::from_utf8(output).unwrap().starts_with("Confirm upload? ("));
    }
}
