#![no_main]

use libfuzzer_sys::fuzz_target;
use tracehouse_query::optimizer::regex_match;
use tracehouse_query::Expr;

fuzz_target!(|data: &[u8]| {
    // Arbitrary patterns: unbalanced groups, trailing backslashes, anchors in
    // odd places, huge alternations, invalid UTF-8 (lossy).
    let pattern = String::from_utf8_lossy(data);
    let column = Expr::ident("uri");

    // Must return Ok or Err, never panic, for both polarities.
    let _ = regex_match::optimize(&column, &pattern, false);
    let _ = regex_match::optimize(&column, &pattern, true);
});
