use syn::parse::{Parse, ParseStream};

use super::*;
use crate::utils::{parse_flag, parse_key_value};

mod kw {
    syn::custom_keyword!(capacity);
    syn::custom_keyword!(policy);
    syn::custom_keyword!(persistent);
}

/// The arguments of `#[memoize(...)]`.
#[derive(Default)]
pub struct Meta {
    capacity: Option<usize>,
    policy: Option<syn::Ident>,
    persistent: bool,
}

impl Parse for Meta {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut meta = Meta::default();
        while !input.is_empty() {
            if let Some(lit) = parse_key_value::<kw::capacity, syn::LitInt>(input)? {
                meta.capacity = Some(lit.base10_parse()?);
            } else if let Some(lit) = parse_key_value::<kw::policy, syn::LitStr>(input)? {
                meta.policy = Some(policy_variant(&lit)?);
            } else if parse_flag::<kw::persistent>(input)? {
                meta.persistent = true;
            } else {
                return Err(input.error(
                    "ccl-base: expected `capacity = N`, `policy = \"...\"` or `persistent`",
                ));
            }
        }
        Ok(meta)
    }
}

/// Map a policy name to its variant.
fn policy_variant(lit: &syn::LitStr) -> Result<syn::Ident> {
    let variant = match lit.value().as_str() {
        "fifo" => "Fifo",
        "lru" => "Lru",
        "lfu" => "Lfu",
        other => bail!(lit, "cache retention policy `{}` not recognized", other),
    };
    Ok(syn::Ident::new(variant, lit.span()))
}

/// Memoize a function.
pub fn expand(meta: Meta, mut func: syn::ItemFn) -> Result<proc_macro2::TokenStream> {
    if let Some(param) = func.sig.generics.params.first() {
        bail!(param, "generic functions are not supported");
    }
    if let Some(asyncness) = &func.sig.asyncness {
        bail!(asyncness, "async functions are not supported");
    }

    let mut args = vec![];
    for input in &func.sig.inputs {
        let typed = match input {
            syn::FnArg::Typed(typed) => typed,
            syn::FnArg::Receiver(_) => {
                bail!(input, "methods are not supported")
            }
        };

        let name = match typed.pat.as_ref() {
            syn::Pat::Ident(syn::PatIdent {
                by_ref: None,
                mutability: None,
                ident,
                subpat: None,
                ..
            }) => ident.clone(),
            pat => bail!(pat, "only simple identifiers are supported"),
        };

        args.push(name);
    }

    // Strip `#[default(...)]` and fill in omitted optional arguments.
    let mut defaults = vec![];
    for (input, name) in func.sig.inputs.iter_mut().zip(&args) {
        let syn::FnArg::Typed(typed) = input else { continue };
        let mut default = None;
        for attr in std::mem::take(&mut typed.attrs) {
            if !attr.path().is_ident("default") {
                typed.attrs.push(attr);
            } else if default.is_some() {
                bail!(attr, "duplicate default");
            } else {
                default = Some(attr.parse_args::<syn::Expr>()?);
            }
        }

        if let Some(expr) = default {
            defaults.push(quote! {
                let #name = ::core::option::Option::or(
                    #name,
                    ::core::option::Option::Some(#expr),
                );
            });
        }
    }

    let output = match &func.sig.output {
        syn::ReturnType::Default => quote! { () },
        syn::ReturnType::Type(_, ty) => quote! { #ty },
    };

    let mut config = quote! { ::ccl_base::internal::CacheConfig::new() };
    if let Some(capacity) = meta.capacity {
        config = quote! { #config.capacity(#capacity) };
    }
    if let Some(policy) = &meta.policy {
        config = quote! { #config.policy(::ccl_base::internal::Policy::#policy) };
    }
    if meta.persistent {
        config = quote! { #config.persistent() };
    }

    // Construct a tuple from all arguments.
    let arg_tuple = quote! { (#(#args,)*) };

    // Key the arguments by name.
    let names = args.iter().map(|arg| arg.to_string());
    let key = quote! {
        |#arg_tuple| ::ccl_base::internal::named(::std::vec![
            #((#names, ::ccl_base::internal::ToArg::to_arg(#args)),)*
        ])
    };

    // Construct the inner closure.
    let body = &func.block;
    let closure = quote! { |#arg_tuple| #body };

    // Adjust the function's body.
    let name = func.sig.ident.to_string();
    func.block = parse_quote! { {
        static __STORE: ::std::sync::LazyLock<
            ::std::sync::Arc<::ccl_base::internal::Store<#output>>,
        > = ::std::sync::LazyLock::new(|| {
            ::ccl_base::internal::global()
                .register(::core::concat!(::core::module_path!(), "::", #name), #config)
        });

        #(#defaults)*
        ::ccl_base::internal::memoize(
            ::ccl_base::internal::global(),
            &**__STORE,
            #arg_tuple,
            #key,
            #closure,
        )
    } };

    Ok(quote! { #func })
}
