use crate::utils::{apply_derives, ensure_required_fields, has_serde_key};
use proc_macro::TokenStream;
use quote::quote;
use std::collections::HashMap;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Expr, Ident, Item, Result, Token, Type, parse::Parse, parse::ParseStream, parse_macro_input};

/// #[domain_event] 宏实现
/// - 仅支持具名字段变体：`Variant { .. }`
/// - 确保每个变体具备字段：`event_id: String`, `created_at: EventTime`（缺失时追加到最前）
/// - 序列化为内部标签形式 `{ "type": <event_type>, event_id, created_at, ...payload }`
/// - 生成 `::outbox_domain::domain_event::DomainEvent` 实现（event_id/event_type/created_at）
/// - 变体可覆写事件类型：`#[event(event_type = "...")]`，默认 `EnumName.Variant`
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(
            proc_macro2::TokenStream::from(attr).span(),
            "#[domain_event] takes no arguments; set event types per variant with #[event(event_type = \"...\")]",
        )
        .to_compile_error()
        .into();
    }
    let mut input = parse_macro_input!(item as Item);

    let enum_item = match &mut input {
        Item::Enum(e) => e,
        other => {
            return syn::Error::new(
                other.span(),
                "#[domain_event] can only be used on enum types",
            )
            .to_compile_error()
            .into();
        }
    };

    if enum_item.variants.is_empty() {
        return syn::Error::new(
            enum_item.ident.span(),
            "#[domain_event] requires at least one variant",
        )
        .to_compile_error()
        .into();
    }

    // 合并/追加默认派生：Debug, Clone, PartialEq, Serialize, Deserialize
    let required: Vec<syn::Path> = vec![
        syn::parse_quote!(Debug),
        syn::parse_quote!(Clone),
        syn::parse_quote!(PartialEq),
        syn::parse_quote!(serde::Serialize),
        syn::parse_quote!(serde::Deserialize),
    ];
    apply_derives(&mut enum_item.attrs, required);

    if has_serde_key(&enum_item.attrs, "tag") || has_serde_key(&enum_item.attrs, "untagged") {
        return syn::Error::new(
            enum_item.ident.span(),
            "#[domain_event] manages the serde tag itself; remove #[serde(tag/untagged)]",
        )
        .to_compile_error()
        .into();
    }
    enum_item.attrs.push(syn::parse_quote!(#[serde(tag = "type")]));

    let enum_name_string = enum_item.ident.to_string();
    let mut variant_types: HashMap<String, syn::LitStr> = HashMap::new();

    for v in &mut enum_item.variants {
        match &mut v.fields {
            syn::Fields::Named(fields_named) => {
                let id_ty: Type = syn::parse_quote! { String };
                let time_ty: Type = syn::parse_quote! { ::outbox_domain::domain_event::EventTime };
                ensure_required_fields(
                    fields_named,
                    &[("event_id", &id_ty), ("created_at", &time_ty)],
                    /*reposition_existing*/ false,
                );
            }
            _ => {
                return syn::Error::new(
                    v.span(),
                    "#[domain_event] supports only named-field enum variants, e.g., Variant { x: T }",
                )
                .to_compile_error()
                .into();
            }
        }

        if has_serde_key(&v.attrs, "rename") {
            return syn::Error::new(
                v.span(),
                "use #[event(event_type = \"...\")] instead of #[serde(rename)] on domain event variants",
            )
            .to_compile_error()
            .into();
        }

        let mut retained_attrs = Vec::new();
        let mut type_lit: Option<syn::LitStr> = None;

        for attr in v.attrs.iter() {
            if attr.path().is_ident("event") {
                match parse_variant_event_attr(attr) {
                    Ok(lit) => {
                        if type_lit.is_some() {
                            return syn::Error::new(
                                attr.span(),
                                "duplicate 'event_type' specified for this variant",
                            )
                            .to_compile_error()
                            .into();
                        }
                        type_lit = Some(lit);
                    }
                    Err(err) => return err.to_compile_error().into(),
                }
            } else {
                retained_attrs.push(attr.clone());
            }
        }

        let lit = type_lit.unwrap_or_else(|| {
            syn::LitStr::new(&format!("{}.{}", enum_name_string, v.ident), v.ident.span())
        });
        if lit.value().is_empty() {
            return syn::Error::new(lit.span(), "event_type must not be empty")
                .to_compile_error()
                .into();
        }
        if let Some(prev) = variant_types.values().find(|p| p.value() == lit.value()) {
            return syn::Error::new(
                lit.span(),
                format!("event_type \"{}\" is already used by another variant", prev.value()),
            )
            .to_compile_error()
            .into();
        }

        retained_attrs.push(syn::parse_quote!(#[serde(rename = #lit)]));
        v.attrs = retained_attrs;
        variant_types.insert(v.ident.to_string(), lit);
    }

    // 生成 DomainEvent 实现
    let enum_ident = &enum_item.ident;
    let (impl_generics, ty_generics, where_clause) = enum_item.generics.split_for_impl();

    let type_match_arms = enum_item.variants.iter().map(|v| {
        let v_ident = &v.ident;
        let lit = &variant_types[&v_ident.to_string()];
        quote! { Self::#v_ident { .. } => #lit }
    });

    let id_match_arms = enum_item.variants.iter().map(|v| {
        let v_ident = &v.ident;
        quote! { Self::#v_ident { event_id, .. } => event_id.as_str() }
    });

    let time_match_arms = enum_item.variants.iter().map(|v| {
        let v_ident = &v.ident;
        quote! { Self::#v_ident { created_at, .. } => *created_at }
    });

    let out = quote! {
        #enum_item

        impl #impl_generics ::outbox_domain::domain_event::DomainEvent for #enum_ident #ty_generics #where_clause {
            fn event_id(&self) -> &str { match self { #( #id_match_arms, )* } }
            fn event_type(&self) -> &str { match self { #( #type_match_arms, )* } }
            fn created_at(&self) -> ::outbox_domain::domain_event::EventTime { match self { #( #time_match_arms, )* } }
        }
    };

    TokenStream::from(out)
}

// -------- parsing --------

fn parse_variant_event_attr(attr: &syn::Attribute) -> Result<syn::LitStr> {
    match &attr.meta {
        syn::Meta::List(_) => {
            let mut ty: Option<syn::LitStr> = None;
            let pairs: Punctuated<VariantEventAttrKv, Token![,]> = attr
                .parse_args_with(Punctuated::<VariantEventAttrKv, Token![,]>::parse_terminated)?;

            for kv in pairs {
                match kv.key.to_string().as_str() {
                    "event_type" => {
                        if ty.is_some() {
                            return Err(syn::Error::new(
                                kv.key.span(),
                                "duplicate key 'event_type' in attribute",
                            ));
                        }
                        let lit = match kv.value {
                            Expr::Lit(syn::ExprLit {
                                lit: syn::Lit::Str(lit),
                                ..
                            }) => lit,
                            other => {
                                return Err(syn::Error::new(
                                    other.span(),
                                    "expected string literal for 'event_type'",
                                ));
                            }
                        };
                        ty = Some(lit);
                    }
                    _ => {
                        return Err(syn::Error::new(
                            kv.key.span(),
                            "unknown key; expected 'event_type'",
                        ));
                    }
                }
            }

            ty.ok_or_else(|| syn::Error::new(attr.span(), "expected #[event(event_type = \"...\")]"))
        }
        other => Err(syn::Error::new(other.span(), "expected #[event(...)]")),
    }
}

struct VariantEventAttrKv {
    key: Ident,
    #[allow(dead_code)]
    eq: Token![=],
    value: Expr,
}

impl Parse for VariantEventAttrKv {
    fn parse(input: ParseStream) -> Result<Self> {
        Ok(Self {
            key: input.parse()?,
            eq: input.parse()?,
            value: input.parse()?,
        })
    }
}
