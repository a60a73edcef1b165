use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr, parse_macro_input};

#[proc_macro_derive(FormValues, attributes(form))]
pub fn derive_form_values(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    if !input.generics.params.is_empty() {
        return syn::Error::new_spanned(
            input.ident,
            "FormValues derive currently supports only non-generic structs",
        )
        .to_compile_error()
        .into();
    }

    let model_ident = input.ident;

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return syn::Error::new_spanned(
                    model_ident,
                    "FormValues derive requires a struct with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new_spanned(
                model_ident,
                "FormValues derive is only supported on structs",
            )
            .to_compile_error()
            .into();
        }
    };

    let inform = inform_path();
    let mut initializers = Vec::new();

    for field in named_fields {
        let Some(field_ident) = field.ident else {
            continue;
        };

        let mut control_name = field_ident.to_string();
        for attr in &field.attrs {
            if !attr.path().is_ident("form") {
                continue;
            }
            let parsed = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    let value: LitStr = meta.value()?.parse()?;
                    control_name = value.value();
                    Ok(())
                } else {
                    Err(meta.error("unsupported form attribute, expected `name = \"...\"`"))
                }
            });
            if let Err(error) = parsed {
                return error.to_compile_error().into();
            }
        }

        initializers.push(quote! {
            #field_ident: #inform::form::FormValue::from_form_value(
                #control_name,
                values.lookup(#control_name),
            )?
        });
    }

    quote! {
        impl #inform::form::FromFormValues for #model_ident {
            fn from_form_values(
                values: &#inform::form::FormValues,
            ) -> #inform::form::FormResult<Self> {
                Ok(Self {
                    #(#initializers,)*
                })
            }
        }
    }
    .into()
}

fn inform_path() -> TokenStream2 {
    match crate_name("inform") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) => quote!(crate),
        Err(_) => quote!(::inform),
    }
}
