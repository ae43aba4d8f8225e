use std::io::{BufRead, Write};

pub const MODE_QUESTION: &str = "WOULD LIKE TO SEE STUDENTS GRADES ANALYSIS GRAPHICALLY ?(yes/no): ";

pub fn ask_yes_no<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    question: &str,
) -> anyhow::Result<bool> {
    write!(out, "{question}")?;
    out.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}
