/// Normalize raw oracle tool input into a single-line argument string.
pub fn sanitize(raw: &str) -> String {
    raw.replace('\n', " ")
        .replace('\t', " ")
        .replace('\r', " ")
        .replace("\\n", "")
        .replace('"', "")
        .trim()
        .to_string()
}

/// Split sanitized input into positional arguments.
///
/// Tools taking at most one argument receive the input whole. Otherwise the
/// input is split on commas that are not nested inside brackets.
pub fn split_args(input: &str, arity: usize) -> Vec<String> {
    if arity <= 1 {
        return vec![input.trim().to_string()];
    }

    let mut args = Vec::new();
    let mut current = String::new();
    let mut depth: usize = 0;

    for c in input.chars() {
        match c {
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                args.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    args.push(current.trim().to_string());
    args
}
