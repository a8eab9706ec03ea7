//! Helpers to get a parser and parse modules.
use std::sync::Arc;

use anyhow::{anyhow, Result};

use swc_common::{
    comments::{Comments, SingleThreadedComments},
    FileName, SourceFile, SourceMap,
};
use swc_ecma_ast::{Module, ModuleItem};
use swc_ecma_parser::{lexer::Lexer, EsConfig, Parser, StringInput, Syntax};

pub(crate) fn get_parser<'a>(
    fm: &'a SourceFile,
    comments: Option<&'a dyn Comments>,
) -> Parser<Lexer<'a, StringInput<'a>>> {
    let lexer = Lexer::new(
        Syntax::Es(EsConfig {
            dynamic_import: true,
            ..Default::default()
        }),
        Default::default(),
        StringInput::from(fm),
        comments,
    );
    Parser::new_from(lexer)
}

/// Parse a source file as a module.
///
/// CommonJS code written in sloppy mode is not a valid module so when
/// module parsing fails the file is parsed again as a script and the
/// statements are wrapped in a module.
pub fn parse_source(
    fm: &SourceFile,
    comments: &SingleThreadedComments,
) -> std::result::Result<Module, String> {
    let module_error = match get_parser(fm, Some(comments)).parse_module() {
        Ok(module) => return Ok(module),
        Err(e) => e,
    };

    match get_parser(fm, Some(comments)).parse_script() {
        Ok(script) => Ok(Module {
            span: script.span,
            body: script.body.into_iter().map(ModuleItem::Stmt).collect(),
            shebang: script.shebang,
        }),
        Err(_) => Err(format!("{:?}", module_error)),
    }
}

/// Parse a module from a string of code.
pub fn load_code(
    code: &str,
) -> Result<(Arc<SourceMap>, Module, SingleThreadedComments)> {
    let sm: Arc<SourceMap> = Arc::new(Default::default());
    let fm = sm.new_source_file(
        FileName::Custom(String::from("input.js")),
        code.into(),
    );
    let comments: SingleThreadedComments = Default::default();
    let module = parse_source(&fm, &comments).map_err(|e| anyhow!(e))?;
    Ok((sm, module, comments))
}
