use crate::utils::{apply_derives, ensure_required_fields, has_serde_key};
use proc_macro::TokenStream;
use quote::{ToTokens, quote};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Item, Result, Token, Type, parse::Parse, parse::ParseStream, parse_macro_input};

/// #[entity_with_events] 宏实现
/// - 确保字段 `id: IdType`, `event_count: i64`, `event_queue: Vec<Event>` 存在并置于最前；
///   新增的计数/队列字段带 `#[serde(default)]`，旧文档缺失时按空队列处理
/// - 派生 Debug, Clone, Serialize, Deserialize
/// - 实现 `::outbox_domain::entity::HasDomainEvents`
/// - 参数：`#[entity_with_events(event = EventType, id = IdType, collection = "name")]`；
///   `event` 必填，`id` 默认 `String`，`collection` 默认结构体名
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as EntityAttrConfig);
    let input = parse_macro_input!(item as Item);

    let mut st = match input {
        Item::Struct(s) => s,
        other => {
            return syn::Error::new(other.span(), "#[entity_with_events] only on struct")
                .to_compile_error()
                .into();
        }
    };

    let Some(event_type) = cfg.event_ty else {
        return syn::Error::new(
            st.ident.span(),
            "#[entity_with_events] requires `event = EventType`",
        )
        .to_compile_error()
        .into();
    };

    let fields_named = match &mut st.fields {
        syn::Fields::Named(f) => f,
        _ => {
            return syn::Error::new(st.span(), "only supports named-field struct")
                .to_compile_error()
                .into();
        }
    };

    let id_type = cfg.id_ty.unwrap_or_else(|| syn::parse_quote! { String });
    let count_type: Type = syn::parse_quote! { i64 };
    let queue_type: Type = syn::parse_quote! { ::std::vec::Vec<#event_type> };

    let added = ensure_required_fields(
        fields_named,
        &[
            ("id", &id_type),
            ("event_count", &count_type),
            ("event_queue", &queue_type),
        ],
        /*reposition_existing*/ true,
    );

    for field in fields_named.named.iter_mut() {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let is_event_field = ident == "event_count" || ident == "event_queue";
        if is_event_field
            && added.iter().any(|a| ident == a)
            && !has_serde_key(&field.attrs, "default")
        {
            field.attrs.push(syn::parse_quote!(#[serde(default)]));
        }
    }

    let required: Vec<syn::Path> = vec![
        syn::parse_quote!(Debug),
        syn::parse_quote!(Clone),
        syn::parse_quote!(serde::Serialize),
        syn::parse_quote!(serde::Deserialize),
    ];
    apply_derives(&mut st.attrs, required);

    let ident = &st.ident;
    let collection = cfg
        .collection
        .unwrap_or_else(|| syn::LitStr::new(&ident.to_string(), ident.span()));
    let (impl_generics, ty_generics, where_clause) = st.generics.split_for_impl();

    let expanded = quote! {
        #st

        impl #impl_generics ::outbox_domain::entity::HasDomainEvents for #ident #ty_generics #where_clause {
            type Id = #id_type;
            type Event = #event_type;

            const COLLECTION: &'static str = #collection;

            fn id(&self) -> &Self::Id { &self.id }

            fn event_count(&self) -> i64 { self.event_count }

            fn event_queue(&self) -> &[Self::Event] { &self.event_queue }
        }
    };

    TokenStream::from(expanded)
}

// -------- parsing --------

struct EntityAttrConfig {
    id_ty: Option<Type>,
    event_ty: Option<Type>,
    collection: Option<syn::LitStr>,
}

impl Parse for EntityAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut cfg = Self {
            id_ty: None,
            event_ty: None,
            collection: None,
        };

        if input.is_empty() {
            return Ok(cfg);
        }

        let pairs: Punctuated<syn::ExprAssign, Token![,]> =
            Punctuated::<syn::ExprAssign, Token![,]>::parse_terminated(input)?;

        for assign in pairs.into_iter() {
            let key_ident = match *assign.left {
                syn::Expr::Path(p) if p.path.segments.len() == 1 => {
                    p.path.segments[0].ident.clone()
                }
                other => return Err(syn::Error::new(other.span(), "invalid attribute key")),
            };
            let duplicate = || {
                syn::Error::new(
                    key_ident.span(),
                    format!("duplicate key '{key_ident}' in attribute"),
                )
            };
            match key_ident.to_string().as_str() {
                "id" => {
                    if cfg.id_ty.is_some() {
                        return Err(duplicate());
                    }
                    cfg.id_ty = Some(syn::parse2(assign.right.to_token_stream())?);
                }
                "event" => {
                    if cfg.event_ty.is_some() {
                        return Err(duplicate());
                    }
                    cfg.event_ty = Some(syn::parse2(assign.right.to_token_stream())?);
                }
                "collection" => {
                    if cfg.collection.is_some() {
                        return Err(duplicate());
                    }
                    let lit: syn::LitStr = syn::parse2(assign.right.to_token_stream())?;
                    if lit.value().is_empty() {
                        return Err(syn::Error::new(lit.span(), "collection must not be empty"));
                    }
                    cfg.collection = Some(lit);
                }
                _ => {
                    return Err(syn::Error::new(
                        key_ident.span(),
                        "unknown key; expected 'id' | 'event' | 'collection'",
                    ));
                }
            }
        }

        Ok(cfg)
    }
}
