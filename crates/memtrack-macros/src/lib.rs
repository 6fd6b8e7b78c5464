use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Ident, ItemFn, parse_macro_input};

/// Resets `memtrack::TRACKER` on entry and prints its status when the
/// function returns. `#[memtrack::main(trace)]` also traces every allocation.
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    let trace = if attr.is_empty() {
        false
    } else {
        let arg = parse_macro_input!(attr as Ident);
        if arg != "trace" {
            return syn::Error::new_spanned(arg, "expected `trace` or no argument")
                .to_compile_error()
                .into();
        }
        true
    };

    let input = parse_macro_input!(item as ItemFn);
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;

    let guard: TokenStream2 = if trace {
        quote! { memtrack::StatusGuard::traced(&memtrack::TRACKER) }
    } else {
        quote! { memtrack::StatusGuard::new(&memtrack::TRACKER) }
    };

    let output = quote! {
        #vis #sig {
            let _memtrack = #guard;

            #block
        }
    };

    output.into()
}

#[proc_macro_attribute]
pub fn measure(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;

    let name = sig.ident.to_string();
    let asyncness = sig.asyncness.is_some();

    let output = if asyncness {
        quote! {
            #vis #sig {
                async {
                    let _guard = memtrack::MeasureGuard::new(concat!(module_path!(), "::", #name));
                    #block
                }.await
            }
        }
    } else {
        quote! {
            #vis #sig {
                let _guard = memtrack::MeasureGuard::new(concat!(module_path!(), "::", #name));
                #block
            }
        }
    };

    output.into()
}
