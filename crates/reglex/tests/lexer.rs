//! Tokenization scenarios run through both the synchronous and the threaded lexer.

use std::sync::Arc;

use gbnf::{convert_to_bnf, parse, ConvertOptions, Grammar};
use proptest::prelude::*;
use reglex::{
    assemble, AssembleOptions, LexError, Lexer, LexerGrammar, LexerOptions, LexicToken,
    ThreadedLexer, TokenSource,
};
use rstest::rstest;

#[derive(Clone, Copy, Debug)]
enum Mode {
    Sync,
    Threaded,
}

const OPERATORS: &str = r#"
    <ident> := "[abc]+" ;
    <operator> := "[+\-]" ;
    <number> := "\d+" ;
"#;

fn build(lexics: &str, fallback: bool) -> (Grammar, Arc<LexerGrammar>) {
    let mut grammar = parse(lexics).unwrap();
    convert_to_bnf(&mut grammar, &ConvertOptions::default()).unwrap();
    let options = AssembleOptions {
        use_error_fallback: fallback,
        ..Default::default()
    };
    let lexer = assemble(&grammar, &options).unwrap();
    (grammar, Arc::new(lexer))
}

fn source(
    grammar: Arc<LexerGrammar>,
    input: &str,
    buffer_size: usize,
    mode: Mode,
) -> Box<dyn TokenSource> {
    let options = LexerOptions {
        buffer_size,
        queue_capacity: 2,
    };
    let reader = std::io::Cursor::new(input.as_bytes().to_vec());
    let lexer = Lexer::new(grammar, reader, &options);
    match mode {
        Mode::Sync => Box::new(lexer),
        Mode::Threaded => Box::new(ThreadedLexer::new(lexer, &options)),
    }
}

/// Collects the tokens as `(text, tag name)` pairs.
fn run(
    grammar: &Grammar,
    lexer: Arc<LexerGrammar>,
    input: &str,
    buffer_size: usize,
    mode: Mode,
) -> Result<Vec<(String, String)>, LexError> {
    let mut source = source(lexer, input, buffer_size, mode);
    let mut tokens = Vec::new();
    loop {
        match source.next_token() {
            Ok(LexicToken {
                token_type_id,
                text,
            }) => tokens.push((text, grammar.tag_name(token_type_id).to_owned())),
            Err(LexError::EndOfStream) => return Ok(tokens),
            Err(err) => return Err(err),
        }
    }
}

fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
    expected
        .iter()
        .map(|(text, name)| (text.to_string(), name.to_string()))
        .collect()
}

#[rstest]
fn tokens_span_buffer_boundaries(
    #[values(1, 2, 5, 2048)] buffer_size: usize,
    #[values(Mode::Sync, Mode::Threaded)] mode: Mode,
) {
    let (grammar, lexer) = build(r#"<ident> := "\w+" ; <operator> := "[;]" ;"#, false);
    let tokens = run(&grammar, lexer, "aaaaaabbbbbbbbbbb;11", buffer_size, mode).unwrap();
    assert_eq!(
        tokens,
        pairs(&[
            ("aaaaaabbbbbbbbbbb", "ident"),
            (";", "operator"),
            ("11", "ident"),
        ])
    );
}

#[rstest]
fn operators_and_numbers(
    #[values(1, 5, 2048)] buffer_size: usize,
    #[values(Mode::Sync, Mode::Threaded)] mode: Mode,
) {
    let (grammar, lexer) = build(OPERATORS, false);
    let tokens = run(&grammar, lexer, "a+2--  ccacb +", buffer_size, mode).unwrap();
    assert_eq!(
        tokens,
        pairs(&[
            ("a", "ident"),
            ("+", "operator"),
            ("2", "number"),
            ("-", "operator"),
            ("-", "operator"),
            ("ccacb", "ident"),
            ("+", "operator"),
        ])
    );
}

#[rstest]
fn uncovered_input_falls_back(
    #[values(1, 5, 2048)] buffer_size: usize,
    #[values(Mode::Sync, Mode::Threaded)] mode: Mode,
) {
    let (grammar, lexer) = build(OPERATORS, true);
    let mut source = source(lexer, "a+2-- go", buffer_size, mode);
    let mut tokens = Vec::new();
    let invalid = loop {
        match source.next_token() {
            Ok(token) => tokens.push(grammar.tag_name(token.token_type_id).to_owned()),
            Err(err) => break err,
        }
    };
    assert_eq!(tokens, ["ident", "operator", "number", "operator", "operator"]);
    match invalid {
        LexError::InvalidToken { position, text } => {
            assert_eq!(text, "go");
            assert_eq!(position.offset, 6);
            assert_eq!(position.column, 7);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(source.next_token(), Err(LexError::EndOfStream)));
}

#[rstest]
fn uncovered_input_is_unmatchable(
    #[values(1, 5, 2048)] buffer_size: usize,
    #[values(Mode::Sync, Mode::Threaded)] mode: Mode,
) {
    let (grammar, lexer) = build(OPERATORS, false);
    let err = run(&grammar, lexer, "a+2-- go", buffer_size, mode).unwrap_err();
    match err {
        LexError::UnmatchableInput { position, snippet } => {
            assert_eq!(position.offset, 6);
            assert!(snippet.starts_with('g'));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[rstest]
#[case(Mode::Sync)]
#[case(Mode::Threaded)]
fn whitespace_is_not_a_token(#[case] mode: Mode) {
    let (grammar, lexer) = build(r#"<ident> := "\w+" ;"#, false);
    let tokens = run(&grammar, lexer, "a   b", 2048, mode).unwrap();
    assert_eq!(tokens, pairs(&[("a", "ident"), ("b", "ident")]));
}

#[test]
fn custom_whitespace() {
    let (grammar, lexer) = build(
        r#"
        <ident> := "[a-z]+" ;
        <whitespace> ::= {" "}+ ;
        "#,
        false,
    );
    let tokens = run(&grammar, lexer.clone(), "ab  cd", 3, Mode::Sync).unwrap();
    assert_eq!(tokens, pairs(&[("ab", "ident"), ("cd", "ident")]));

    // newlines are no longer whitespace
    let err = run(&grammar, lexer, "ab\ncd", 3, Mode::Sync).unwrap_err();
    assert!(matches!(err, LexError::UnmatchableInput { .. }));
}

#[test]
fn grammar_rules_become_tokens() {
    let (grammar, lexer) = build(
        r#"
        <number> ::= <digit> {<digit>}* {"\." {<digit>}+}? ;
        <digit> := "[0-9]" ;
        <dot> := "\." ;
        "#,
        false,
    );
    assert_eq!(lexer.rules().len(), 3);
    let tokens = run(&grammar, lexer, "12.5 7 .", 2048, Mode::Sync).unwrap();
    assert_eq!(
        tokens,
        pairs(&[("12.5", "number"), ("7", "number"), (".", "dot")])
    );
}

#[test]
fn multibyte_text_across_boundaries() {
    let (grammar, lexer) = build(r#"<word> := "\w+" ; <arrow> := "→" ;"#, false);
    for buffer_size in [1, 2, 3, 7] {
        let tokens = run(&grammar, lexer.clone(), "héllo→wörld →", buffer_size, Mode::Threaded).unwrap();
        assert_eq!(
            tokens,
            pairs(&[
                ("héllo", "word"),
                ("→", "arrow"),
                ("wörld", "word"),
                ("→", "arrow"),
            ])
        );
    }
}

#[test]
fn tokens_iterator_stops_after_fatal_error() {
    let (_, lexer) = build(r#"<ident> := "[a-z]+" ;"#, false);
    let mut lexer = Lexer::new(lexer, "ab ? cd".as_bytes(), &LexerOptions::default());
    let results: Vec<_> = lexer.tokens().collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(LexError::UnmatchableInput { .. })));
}

#[test]
fn tokens_iterator_continues_after_invalid_token() {
    let (_, lexer) = build(r#"<ident> := "[a-z]+" ;"#, true);
    let mut lexer = Lexer::new(lexer, "ab\n?\ncd".as_bytes(), &LexerOptions::default());
    let texts: Vec<_> = lexer
        .tokens()
        .map(|result| match result {
            Ok(token) => token.text,
            Err(LexError::InvalidToken { text, .. }) => format!("invalid {text}"),
            Err(err) => panic!("{err}"),
        })
        .collect();
    assert_eq!(texts, ["ab", "invalid ?", "cd"]);
}

proptest! {
    #[test]
    fn buffer_size_does_not_change_tokens(
        input in "[abc+\\-0-9 \t\n]{0,64}",
        buffer_size in 1usize..16,
    ) {
        let (grammar, lexer) = build(OPERATORS, false);
        let expected = run(&grammar, lexer.clone(), &input, 4096, Mode::Sync).unwrap();
        let actual = run(&grammar, lexer, &input, buffer_size, Mode::Sync).unwrap();
        prop_assert_eq!(expected, actual);
    }

    #[test]
    fn tokens_cover_the_input(input in "[abc+\\-0-9 ]{0,64}") {
        let (grammar, lexer) = build(OPERATORS, false);
        let tokens = run(&grammar, lexer, &input, 3, Mode::Sync).unwrap();
        let joined: String = tokens.into_iter().map(|(text, _)| text).collect();
        prop_assert_eq!(joined, input.replace(' ', ""));
    }
}
