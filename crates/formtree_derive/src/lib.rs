use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, LitStr, parse_macro_input};

/// Derives `GroupModel` for a struct whose fields are node types.
///
/// Generates, next to the input struct `Name`:
/// - `NameValue` — the derived plain-value shape: each field mapped through
///   the child node's own value derivation, recursively;
/// - `NamePatch` — the partial shape: every field optional, absent fields
///   skipped on encode;
/// - `NameFields` — the lens set, one `const fn` accessor per field;
/// - one lens type per field implementing `ControlLens<Name>`.
#[proc_macro_derive(GroupModel)]
pub fn derive_group_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    if !input.generics.params.is_empty() {
        return syn::Error::new_spanned(
            input.ident,
            "GroupModel derive currently supports only non-generic structs",
        )
        .to_compile_error()
        .into();
    }

    let model_ident = input.ident;
    let value_ident = format_ident!("{model_ident}Value");
    let patch_ident = format_ident!("{model_ident}Patch");
    let fields_struct_ident = format_ident!("{model_ident}Fields");

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return syn::Error::new(
                    Span::call_site(),
                    "GroupModel derive requires a struct with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new(
                Span::call_site(),
                "GroupModel derive is only supported on structs",
            )
            .to_compile_error()
            .into();
        }
    };

    let (formtree, serde_crate) = formtree_paths();
    let serde_crate = LitStr::new(&serde_crate, Span::call_site());

    let mut value_fields = Vec::new();
    let mut patch_fields = Vec::new();
    let mut children_entries = Vec::new();
    let mut lens_defs = Vec::new();
    let mut fields_methods = Vec::new();

    for field in named_fields {
        let Some(field_ident) = field.ident else {
            continue;
        };
        let field_ty = field.ty;
        let field_name = field_ident.to_string();
        let lens_ident = format_ident!("{model_ident}{}Lens", to_pascal_case(&field_name));

        value_fields.push(quote! {
            pub #field_ident: <#field_ty as #formtree::node::FormNode>::Value,
        });

        patch_fields.push(quote! {
            #[serde(skip_serializing_if = "Option::is_none")]
            pub #field_ident: Option<<#field_ty as #formtree::node::FormNode>::Value>,
        });

        children_entries.push(quote! {
            (#field_name, #formtree::node::FormNode::raw(&self.#field_ident).clone()),
        });

        lens_defs.push(quote! {
            #[derive(Clone, Copy, Debug, Default)]
            pub struct #lens_ident;

            impl #formtree::group::ControlLens<#model_ident> for #lens_ident {
                type Child = #field_ty;

                fn key(self) -> #formtree::group::FieldKey {
                    #formtree::group::FieldKey::new(#field_name)
                }

                fn get(self, record: &#model_ident) -> &Self::Child {
                    &record.#field_ident
                }

                fn replace(self, record: &mut #model_ident, child: Self::Child) -> Self::Child {
                    ::std::mem::replace(&mut record.#field_ident, child)
                }
            }
        });

        fields_methods.push(quote! {
            pub const fn #field_ident(&self) -> #lens_ident {
                #lens_ident
            }
        });
    }

    quote! {
        #[derive(Clone, Debug, PartialEq, #formtree::serde::Serialize, #formtree::serde::Deserialize)]
        #[serde(crate = #serde_crate)]
        pub struct #value_ident {
            #(#value_fields)*
        }

        #[derive(Clone, Debug, Default, PartialEq, #formtree::serde::Serialize)]
        #[serde(crate = #serde_crate)]
        pub struct #patch_ident {
            #(#patch_fields)*
        }

        #[derive(Clone, Copy, Debug, Default)]
        pub struct #fields_struct_ident;

        impl #fields_struct_ident {
            #(#fields_methods)*
        }

        impl #formtree::group::GroupModel for #model_ident {
            type Value = #value_ident;
            type Patch = #patch_ident;
            type Fields = #fields_struct_ident;

            fn fields() -> Self::Fields {
                #fields_struct_ident
            }

            fn children(&self) -> ::std::vec::Vec<(&'static str, #formtree::runtime::RawControl)> {
                ::std::vec![
                    #(#children_entries)*
                ]
            }
        }

        #(#lens_defs)*
    }
    .into()
}

fn formtree_paths() -> (TokenStream2, String) {
    match crate_name("formtree") {
        Ok(FoundCrate::Name(name)) => {
            let serde_crate = format!("{name}::serde");
            let ident = Ident::new(&name, Span::call_site());
            (quote!(::#ident), serde_crate)
        }
        Ok(FoundCrate::Itself) => (quote!(crate), "crate::serde".to_string()),
        Err(_) => (quote!(::formtree), "formtree::serde".to_string()),
    }
}

fn to_pascal_case(input: &str) -> String {
    let mut out = String::new();
    for segment in input.split('_') {
        if segment.is_empty() {
            continue;
        }
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}
