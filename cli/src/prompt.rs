//! Interactive input collection
//!
//! Prompts repeat until the answer parses and falls inside the accepted range.

use std::io::{BufRead, Write};
use std::ops::RangeInclusive;

use anyhow::{bail, Result};

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_answer(&mut self, question: &str) -> Result<String> {
        write!(self.output, "{}", question)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            bail!("input closed before an answer was given");
        }
        Ok(line.trim().to_string())
    }

    /// Ask for a number within `range`, re-asking on bad input.
    pub fn number_in_range(
        &mut self,
        question: &str,
        label: &str,
        range: RangeInclusive<f64>,
    ) -> Result<f64> {
        loop {
            let answer = self.read_answer(question)?;
            let value: f64 = match answer.parse() {
                Ok(v) => v,
                Err(_) => {
                    writeln!(self.output, "[ERROR] The {} must be a number. Try again.", label)?;
                    continue;
                }
            };
            if !value.is_finite() || !range.contains(&value) {
                writeln!(
                    self.output,
                    "[ERROR] The {} must be within [{}, {}]. Try again.",
                    label,
                    range.start(),
                    range.end()
                )?;
                continue;
            }
            return Ok(value);
        }
    }

    /// Ask for free text; an empty answer is `None`.
    pub fn optional_text(&mut self, question: &str) -> Result<Option<String>> {
        let answer = self.read_answer(question)?;
        Ok(if answer.is_empty() { None } else { Some(answer) })
    }
}
