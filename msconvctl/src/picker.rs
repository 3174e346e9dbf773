use std::io::{self, BufRead, Write};

/// Prints a numbered menu and reads the operator's choice.
///
/// Returns `Ok(None)` on end of input or an empty answer. Invalid answers re-prompt.
pub fn pick<R, W>(choices: &[String], mut input: R, mut output: W) -> io::Result<Option<usize>>
where
    R: BufRead,
    W: Write,
{
    if choices.is_empty() {
        return Ok(None);
    }
    for (index, choice) in choices.iter().enumerate() {
        writeln!(output, "  {}) {choice}", index + 1)?;
    }
    loop {
        write!(output, "Select a stream [1-{}]: ", choices.len())?;
        output.flush()?;
        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            return Ok(None);
        }
        let answer = answer.trim();
        if answer.is_empty() {
            return Ok(None);
        }
        match answer.parse::<usize>() {
            Ok(n) if (1..=choices.len()).contains(&n) => return Ok(Some(n - 1)),
            _ => writeln!(output, "Invalid choice '{answer}'")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn choices() -> Vec<String> {
        vec!["cam (720p)".to_string(), "cam (original)".to_string()]
    }

    #[test]
    fn reprompts_until_valid() {
        let mut out = Vec::new();
        let picked = pick(&choices(), Cursor::new("7\nx\n2\n"), &mut out).unwrap();
        assert_eq!(picked, Some(1));
        let shown = String::from_utf8(out).unwrap();
        assert!(shown.contains("  1) cam (720p)"));
        assert_eq!(shown.matches("Invalid choice").count(), 2);
    }

    #[test]
    fn eof_or_blank_cancels() {
        assert_eq!(pick(&choices(), Cursor::new(""), Vec::new()).unwrap(), None);
        assert_eq!(pick(&choices(), Cursor::new("\n"), Vec::new()).unwrap(), None);
        assert_eq!(pick(&[], Cursor::new("1\n"), Vec::new()).unwrap(), None);
    }
}
