//! Compile-time test registration (SPEC_FULL.md §2), the Rust-native stand
//! -in for the out-of-scope source-file parser: in a language with no
//! runtime reflection, `#[lymbo_macros::test]` registers a `CandidateTest`
//! at compile time via `inventory::submit!` rather than the collector
//! discovering it by walking an AST (§9 "Dynamic import of test modules ->
//! deterministic loader").
//!
//! A function may carry the attribute more than once to define several
//! independent cases (§6: "`test(args?, expected?)` ... may be stacked to
//! define multiple cases"); only the outermost instance is expanded by the
//! compiler, so this macro also scans the item's remaining attributes for
//! further `test(...)` markers and strips them out of its own output.

mod args;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, FnArg, Ident, ItemFn, Pat, ReturnType, Type};

use args::TestCase;

/// The reserved parameter name bound to the test's output sink instead of a
/// declared argument (§4.8 step 3, "redirect the test's stdout/stderr into
/// an in-memory sink"): a test that wants to write diagnostic output simply
/// declares a trailing `out: &mut dyn std::io::Write` parameter.
const OUTPUT_PARAM: &str = "out";

#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut func = parse_macro_input!(item as ItemFn);

    let outer = if attr.is_empty() {
        TestCase::default()
    } else {
        parse_macro_input!(attr as TestCase)
    };

    let mut cases = vec![outer];
    let mut parse_error = None;

    func.attrs.retain(|attr| {
        if !is_test_attr(attr) {
            return true;
        }
        if parse_error.is_none() {
            match attr.parse_args::<TestCase>() {
                Ok(case) => cases.push(case),
                Err(err) => parse_error = Some(err),
            }
        }
        false
    });

    if let Some(err) = parse_error {
        return err.to_compile_error().into();
    }

    expand(&func, cases).unwrap_or_else(syn::Error::into_compile_error).into()
}

fn is_test_attr(attr: &syn::Attribute) -> bool {
    attr.path().segments.last().is_some_and(|segment| segment.ident == "test")
}

/// One test function parameter, resolved against its declared `args(...)`
/// source at macro-expansion time.
enum Binding<'a> {
    /// Bound to the shared output sink (`out: &mut dyn std::io::Write`).
    Output(&'a Ident),
    /// Looked up by name in the `keyword` map at call time.
    Keyword(&'a Ident, &'a Type),
    /// Looked up by position in the `positional` slice at call time.
    Positional(&'a Ident, &'a Type, usize),
}

fn expand(func: &ItemFn, cases: Vec<TestCase>) -> syn::Result<TokenStream2> {
    let fn_name = &func.sig.ident;
    let asyncness = func.sig.asyncness;

    if let Some(asyncness) = asyncness {
        return Err(syn::Error::new_spanned(
            asyncness,
            "#[lymbo_macros::test] does not support `async fn`: no async runtime is in lymbo's dependency stack",
        ));
    }

    let params = typed_params(func)?;
    let bindings = bind_params(&params, &cases[0])?;

    // Every case must agree on how many positional slots the function
    // consumes, since they all share the one generated body closure.
    for case in &cases[1..] {
        let rebound = bind_params(&params, case)?;
        let positional_count = |b: &[Binding]| b.iter().filter(|b| matches!(b, Binding::Positional(..))).count();
        if positional_count(&bindings) != positional_count(&rebound) {
            return Err(syn::Error::new_spanned(
                fn_name,
                "every #[lymbo_macros::test] case on one function must declare the same positional arguments",
            ));
        }
    }

    let body_fn_name = format_ident!("__lymbo_test_body_{}", fn_name);
    let body_fn = generate_body_fn(func, &body_fn_name, &bindings)?;

    let case_statics = cases
        .iter()
        .enumerate()
        .map(|(index, case)| generate_case(func, &body_fn_name, index, case))
        .collect::<syn::Result<Vec<_>>>()?;

    Ok(quote! {
        #func

        #body_fn

        #(#case_statics)*
    })
}

/// Pulls out `(pat_ident, type)` for every parameter except the reserved
/// output sink; errors on parameter patterns that aren't a plain
/// identifier (destructuring a test's arguments has no natural mapping
/// onto named `args(...)` entries).
fn typed_params(func: &ItemFn) -> syn::Result<Vec<(Ident, Type)>> {
    let mut params = Vec::new();
    for input in &func.sig.inputs {
        let FnArg::Typed(pat_type) = input else {
            return Err(syn::Error::new_spanned(input, "test functions can't take `self`"));
        };
        let Pat::Ident(pat_ident) = pat_type.pat.as_ref() else {
            return Err(syn::Error::new_spanned(
                &pat_type.pat,
                "test function parameters must be plain identifiers",
            ));
        };
        params.push((pat_ident.ident.clone(), (*pat_type.ty).clone()));
    }
    Ok(params)
}

fn bind_params<'a>(params: &'a [(Ident, Type)], case: &'a TestCase) -> syn::Result<Vec<Binding<'a>>> {
    let mut next_positional = 0usize;
    let mut bindings = Vec::with_capacity(params.len());
    let mut unused_keyword: Vec<&Ident> = case.keyword.iter().map(|(name, _)| name).collect();

    for (ident, ty) in params {
        if ident == OUTPUT_PARAM {
            bindings.push(Binding::Output(ident));
            continue;
        }

        if let Some(pos) = unused_keyword.iter().position(|name| *name == ident) {
            unused_keyword.remove(pos);
            bindings.push(Binding::Keyword(ident, ty));
        } else {
            bindings.push(Binding::Positional(ident, ty, next_positional));
            next_positional += 1;
        }
    }

    if !unused_keyword.is_empty() {
        let name = unused_keyword[0];
        return Err(syn::Error::new_spanned(
            name,
            format!("`{name}` is declared in args(...) but is not a parameter of this function"),
        ));
    }

    if next_positional != case.positional.len() {
        return Err(syn::Error::new_spanned(
            &case.positional.first().map(|_| ident_placeholder()).unwrap_or_else(ident_placeholder),
            format!(
                "args(...) declares {} positional value(s) but the function takes {next_positional} unnamed parameter(s)",
                case.positional.len()
            ),
        ));
    }

    Ok(bindings)
}

fn ident_placeholder() -> Ident {
    format_ident!("args")
}

fn generate_body_fn(func: &ItemFn, body_fn_name: &Ident, bindings: &[Binding]) -> syn::Result<TokenStream2> {
    let fn_name = &func.sig.ident;

    let extractions = bindings.iter().map(|binding| match binding {
        Binding::Output(ident) => quote! { let #ident = __out; },
        Binding::Keyword(ident, ty) => {
            let key = ident.to_string();
            quote! {
                let #ident: #ty = {
                    let __v = keyword.get(#key).ok_or_else(|| {
                        ::lymbo_core::model::TestError::other("TypeError", format!("missing argument `{}`", #key))
                    })?;
                    <#ty as ::lymbo_core::convert::FromValue>::from_value(__v)
                        .map_err(|e| ::lymbo_core::model::TestError::other("TypeError", e))?
                };
            }
        }
        Binding::Positional(ident, ty, index) => {
            quote! {
                let #ident: #ty = {
                    let __v = positional.get(#index).ok_or_else(|| {
                        ::lymbo_core::model::TestError::other("TypeError", "missing positional argument")
                    })?;
                    <#ty as ::lymbo_core::convert::FromValue>::from_value(__v)
                        .map_err(|e| ::lymbo_core::model::TestError::other("TypeError", e))?
                };
            }
        }
    });

    let call_args = bindings.iter().map(|binding| match binding {
        Binding::Output(ident) | Binding::Keyword(ident, _) | Binding::Positional(ident, _, _) => quote! { #ident },
    });

    let is_result = matches!(&func.sig.output, ReturnType::Type(_, ty) if is_result_type(ty));

    let call_and_classify = if is_result {
        quote! {
            match #fn_name(#(#call_args),*) {
                ::std::result::Result::Ok(value) => ::std::result::Result::Ok(
                    ::lymbo_core::convert::IntoValue::into_value(value),
                ),
                ::std::result::Result::Err(error) => ::std::result::Result::Err(
                    ::lymbo_core::model::TestError::other("Error", error.to_string()),
                ),
            }
        }
    } else {
        quote! {
            ::std::result::Result::Ok(::lymbo_core::convert::IntoValue::into_value(#fn_name(#(#call_args),*)))
        }
    };

    Ok(quote! {
        fn #body_fn_name() -> ::lymbo_core::model::TestBody {
            ::std::sync::Arc::new(
                move |positional: &[::lymbo_core::model::Value],
                      keyword: &::std::collections::BTreeMap<::std::string::String, ::lymbo_core::model::Value>,
                      __out: &mut dyn ::std::io::Write|
                      -> ::lymbo_core::model::TestOutcome {
                    #(#extractions)*

                    let __panicked = ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| {
                        #call_and_classify
                    }));

                    match __panicked {
                        ::std::result::Result::Ok(outcome) => outcome,
                        ::std::result::Result::Err(payload) => {
                            ::std::result::Result::Err(::lymbo_core::model::TestError::assertion(
                                ::lymbo_core::convert::panic_message(payload),
                            ))
                        }
                    }
                },
            )
        }
    })
}

/// A loose but practical `Result<..>` detector: checks the return type's
/// last path segment, the way a derive macro distinguishing `Option`/`Vec`
/// shapes would, without resolving type aliases.
fn is_result_type(ty: &Type) -> bool {
    matches!(ty, Type::Path(path) if path.path.segments.last().is_some_and(|s| s.ident == "Result"))
}

fn generate_case(func: &ItemFn, body_fn_name: &Ident, index: usize, case: &TestCase) -> syn::Result<TokenStream2> {
    let fn_name = &func.sig.ident;
    let static_name = format_ident!("__LYMBO_CANDIDATE_{}_{}", fn_name, index);

    let positional_tokens: Vec<_> = case.positional.iter().map(|spec| spec.to_arg_tokens()).collect();
    let keyword_tokens: Vec<_> = case
        .keyword
        .iter()
        .map(|(name, spec)| {
            let name = name.to_string();
            let spec = spec.to_arg_tokens();
            quote! { (#name.to_owned(), #spec) }
        })
        .collect();

    let expected_tokens = match &case.expected {
        Some(spec) => {
            let expected = spec.to_expected_tokens()?;
            quote! { ::std::option::Option::Some(#expected) }
        }
        None => quote! { ::std::option::Option::None },
    };

    Ok(quote! {
        static #static_name: ::lymbo_core::collector::CandidateTest = ::lymbo_core::collector::CandidateTest {
            path: ::std::file!(),
            class: ::std::option::Option::None,
            function: ::std::stringify!(#fn_name),
            asynchronous: false,
            positional: || ::std::vec![#(#positional_tokens),*],
            keyword: || ::std::vec![#(#keyword_tokens),*],
            expected: || #expected_tokens,
            body: #body_fn_name,
        };

        ::lymbo_core::inventory::submit! { #static_name }
    })
}
