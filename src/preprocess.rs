//! Mini-SIL source expansion.
//!
//! The back end has no aggregate types and no bounded iteration, so this
//! layer rewrites the raw source text before tokenization:
//!
//! 1. detach the tail from the first `@cpu` line (reattached untouched),
//! 2. expand `name: type = array[N]...` kernel parameters into scalars,
//! 3. expand `var name: type = array[N]...;` locals into scalar decls,
//! 4. rewrite constant-index uses `name[i][j]` to `name_i_j`,
//! 5. unroll `for v in range(lo, hi):` blocks into straight-line code.
//!
//! Everything here is a text pass; the scanner never sees `array` or `for`.

use crate::error::{CompileError, Span};
use regex::Regex;
use std::sync::LazyLock;

static ARRAY_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^var\s+(\w+)\s*:\s*(\w+)\s*=\s*array((?:\[\d+\])+);?$").expect("valid regex")
});
static ARRAY_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\w+)\s*:\s*(\w+)\s*=\s*array((?:\[\d+\])+)$").expect("valid regex")
});
static KERNEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"kernel\s+(\w+)\s*\(([^)]*)\)\s*\{").expect("valid regex"));
static DIM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").expect("valid regex"));
static FOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)for\s+(\w+)\s+in\s+range\(\s*(\d+)\s*,\s*(\d+)\s*\)\s*:\s*$")
        .expect("valid regex")
});
static INDEXED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)((?:\[\d+\])+)").expect("valid regex"));
static CPU_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*@cpu\b").expect("valid regex"));

/// One expanded array element: `base[indices]` now lives in `scalar`.
#[derive(Debug, Clone)]
struct ArrayMapping {
    base: String,
    indices: Vec<usize>,
    scalar: String,
}

/// Run the full Mini-SIL pipeline over `source`.
pub fn preprocess(source: &str) -> Result<String, CompileError> {
    let (sil, host_tail) = split_host_tail(source)?;
    reject_for_inside_loop(&sil)?;

    let (code, mut mappings) = expand_kernel_params(&sil);
    let (code, local_mappings) = expand_array_decls(&code);
    mappings.extend(local_mappings);
    let code = substitute_array_uses(&code, mappings);
    let code = unroll_for_loops(&code);

    Ok(format!("{}\n{}", code, host_tail))
}

/// Split the source at the first line starting with `@cpu`. The tail is
/// preserved verbatim. A second `@cpu` line anywhere is rejected.
fn split_host_tail(source: &str) -> Result<(String, String), CompileError> {
    let mut matches = CPU_LINE_RE.find_iter(source);
    let Some(first) = matches.next() else {
        return Ok((source.to_string(), String::new()));
    };
    if matches.next().is_some() {
        return Err(CompileError::parse(
            "multiple '@cpu' blocks in one source file",
            None,
        ));
    }
    let sil = source[..first.start()].to_string();
    let tail = source[first.start()..].to_string();
    Ok((sil, tail))
}

/// `for` cannot be unrolled inside a `loop { }` region: the unroller works
/// on indentation while `loop` bodies are brace-delimited. Detect the mix
/// with a brace stack and report it instead of producing garbage.
fn reject_for_inside_loop(code: &str) -> Result<(), CompileError> {
    let mut brace_stack: Vec<bool> = Vec::new();
    let mut prev_word = String::new();
    let mut cur_word = String::new();

    for (line_no, line) in code.lines().enumerate() {
        if FOR_RE.is_match(line) && brace_stack.iter().any(|&opened_by_loop| opened_by_loop) {
            return Err(CompileError::parse(
                "'for' loops inside 'loop { }' blocks are not supported",
                Some(Span::new(line_no, 0)),
            ));
        }
        for ch in line.chars() {
            if ch.is_alphanumeric() || ch == '_' {
                cur_word.push(ch);
                continue;
            }
            if !cur_word.is_empty() {
                prev_word = std::mem::take(&mut cur_word);
            }
            match ch {
                '{' => {
                    brace_stack.push(prev_word == "loop");
                    prev_word.clear();
                }
                '}' => {
                    brace_stack.pop();
                }
                c if c.is_whitespace() => {}
                _ => prev_word.clear(),
            }
        }
        if !cur_word.is_empty() {
            prev_word = std::mem::take(&mut cur_word);
        }
    }
    Ok(())
}

fn dims(dim_text: &str) -> Vec<usize> {
    DIM_RE
        .captures_iter(dim_text)
        .filter_map(|c| c[1].parse().ok())
        .collect()
}

/// All index tuples for the given sizes, in lexicographic (row-major) order.
fn index_tuples(sizes: &[usize]) -> Vec<Vec<usize>> {
    let mut tuples = vec![Vec::new()];
    for &size in sizes {
        let mut next = Vec::with_capacity(tuples.len() * size);
        for tuple in &tuples {
            for i in 0..size {
                let mut grown = tuple.clone();
                grown.push(i);
                next.push(grown);
            }
        }
        tuples = next;
    }
    tuples
}

fn scalar_name(base: &str, indices: &[usize]) -> String {
    let suffix: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
    format!("{}_{}", base, suffix.join("_"))
}

/// Expand `name: type = array[N]...` parameters in every kernel header.
fn expand_kernel_params(code: &str) -> (String, Vec<ArrayMapping>) {
    let mut mappings = Vec::new();
    let mut out = String::with_capacity(code.len());
    let mut last = 0;

    for caps in KERNEL_RE.captures_iter(code) {
        let whole = caps.get(0).expect("match");
        let kname = &caps[1];
        let param_block = &caps[2];

        let mut new_params = Vec::new();
        let mut changed = false;
        for raw in param_block.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let Some(pm) = ARRAY_PARAM_RE.captures(raw) else {
                new_params.push(raw.to_string());
                continue;
            };
            changed = true;
            let base = &pm[1];
            let ty = &pm[2];
            for indices in index_tuples(&dims(&pm[3])) {
                let scalar = scalar_name(base, &indices);
                new_params.push(format!("{}: {}", scalar, ty));
                mappings.push(ArrayMapping {
                    base: base.to_string(),
                    indices,
                    scalar,
                });
            }
        }

        out.push_str(&code[last..whole.start()]);
        if changed {
            out.push_str(&format!("kernel {}({}) {{", kname, new_params.join(", ")));
        } else {
            out.push_str(whole.as_str());
        }
        last = whole.end();
    }
    out.push_str(&code[last..]);
    (out, mappings)
}

/// Expand `var name: type = array[N]...;` lines into one zeroed scalar
/// declaration per element.
fn expand_array_decls(code: &str) -> (String, Vec<ArrayMapping>) {
    let mut mappings = Vec::new();
    let mut lines = Vec::new();

    for line in code.lines() {
        let Some(caps) = ARRAY_DECL_RE.captures(line.trim()) else {
            lines.push(line.to_string());
            continue;
        };
        let indent = &line[..line.len() - line.trim_start().len()];
        let base = &caps[1];
        let ty = &caps[2];
        for indices in index_tuples(&dims(&caps[3])) {
            let scalar = scalar_name(base, &indices);
            lines.push(format!("{}var {}: {} = 0;", indent, scalar, ty));
            mappings.push(ArrayMapping {
                base: base.to_string(),
                indices,
                scalar,
            });
        }
    }
    (lines.join("\n"), mappings)
}

/// Rewrite constant-index uses of expanded arrays. Longest index tuples go
/// first so `a[1][2]` never collides with a one-dimensional `a[1]`.
fn substitute_array_uses(code: &str, mut mappings: Vec<ArrayMapping>) -> String {
    mappings.sort_by(|a, b| b.indices.len().cmp(&a.indices.len()));
    let mut code = code.to_string();
    for mapping in &mappings {
        let mut pattern = format!(r"\b{}", regex::escape(&mapping.base));
        for index in &mapping.indices {
            pattern.push_str(&format!(r"\[\s*{}\s*\]", index));
        }
        let re = Regex::new(&pattern).expect("valid generated regex");
        code = re.replace_all(&code, mapping.scalar.as_str()).into_owned();
    }
    code
}

/// Unroll every `for v in range(lo, hi):` block. Inner loops unroll first
/// via recursion; the loop variable is substituted textually and any
/// now-constant `name[i][j]` uses collapse to their scalar names.
fn unroll_for_loops(code: &str) -> String {
    let lines: Vec<&str> = code.lines().collect();
    let mut result: Vec<String> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let Some(caps) = FOR_RE.captures(line) else {
            result.push(line.to_string());
            i += 1;
            continue;
        };
        let base_indent = caps[1].len();
        let var = caps[2].to_string();
        let lo: usize = caps[3].parse().unwrap_or(0);
        let hi: usize = caps[4].parse().unwrap_or(0);

        let (body, next_i) = collect_block(&lines, i + 1, base_indent);
        let body_unrolled = unroll_for_loops(&dedent(&body));
        let var_re =
            Regex::new(&format!(r"\b{}\b", regex::escape(&var))).expect("valid generated regex");

        for value in lo..hi {
            let value_text = value.to_string();
            for body_line in body_unrolled.lines() {
                let substituted = var_re.replace_all(body_line, value_text.as_str());
                result.push(flatten_indexed(&substituted));
            }
        }
        i = next_i;
    }
    result.join("\n")
}

/// Collect the indented block under a `for` header. Blank lines belong to
/// the block; it ends at the first line indented at or above the header.
fn collect_block<'a>(lines: &[&'a str], start: usize, base_indent: usize) -> (Vec<&'a str>, usize) {
    let mut block = Vec::new();
    let mut i = start;
    while i < lines.len() {
        let line = lines[i];
        if line.trim().is_empty() {
            block.push(line);
            i += 1;
            continue;
        }
        let indent = line.len() - line.trim_start().len();
        if indent <= base_indent {
            break;
        }
        block.push(line);
        i += 1;
    }
    (block, i)
}

fn dedent(lines: &[&str]) -> String {
    let min_indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    let stripped: Vec<&str> = lines
        .iter()
        .map(|l| if l.len() >= min_indent { &l[min_indent..] } else { "" })
        .collect();
    stripped.join("\n")
}

/// `a[0][1]` -> `a_0_1` once every index is a constant.
fn flatten_indexed(line: &str) -> String {
    INDEXED_RE
        .replace_all(line, |caps: &regex::Captures<'_>| {
            let indices: Vec<String> = DIM_RE
                .captures_iter(&caps[2])
                .map(|c| c[1].to_string())
                .collect();
            format!("{}_{}", &caps[1], indices.join("_"))
        })
        .into_owned()
}
