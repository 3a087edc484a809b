use syn::parse::{Parse, ParseStream};

use super::*;
use crate::utils::parse_key_value;

mod kw {
    syn::custom_keyword!(arg);
    syn::custom_keyword!(mutate);
}

/// The arguments of `#[unlock(...)]`.
pub struct Meta {
    arg: usize,
    mutate: bool,
}

impl Parse for Meta {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut meta = Meta { arg: 0, mutate: true };
        while !input.is_empty() {
            if let Some(lit) = parse_key_value::<kw::arg, syn::LitInt>(input)? {
                meta.arg = lit.base10_parse()?;
            } else if let Some(lit) = parse_key_value::<kw::mutate, syn::LitBool>(input)? {
                meta.mutate = lit.value;
            } else {
                return Err(input.error("ccl-base: expected `arg = N` or `mutate = bool`"));
            }
        }
        Ok(meta)
    }
}

/// Wrap a function's body in a mutation scope.
pub fn expand(meta: Meta, mut func: syn::ItemFn) -> Result<proc_macro2::TokenStream> {
    if let Some(asyncness) = &func.sig.asyncness {
        bail!(asyncness, "async functions are not supported");
    }

    let Some(input) = func.sig.inputs.iter().nth(meta.arg) else {
        bail!(func.sig, "there is no argument {} to unlock", meta.arg);
    };

    let target = match input {
        syn::FnArg::Receiver(_) => quote! { self },
        syn::FnArg::Typed(typed) => match typed.pat.as_ref() {
            syn::Pat::Ident(syn::PatIdent { ident, subpat: None, .. }) => quote! { #ident },
            pat => bail!(pat, "only simple identifiers are supported"),
        },
    };

    let mutate = meta.mutate;
    let block = &func.block;
    func.block = parse_quote! { {
        let __scope = ::ccl_base::MutationScope::enter(
            ::ccl_base::internal::Lockable::mutation_guard(&#target),
            #mutate,
        );
        #block
    } };

    Ok(quote! { #func })
}
