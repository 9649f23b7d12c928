use proc_macro::TokenStream as TokenStream1;
use proc_macro2::TokenStream as TokenStream2;
use quote::{quote, ToTokens};
use syn::{parse_macro_input, punctuated::Punctuated, Ident, ImplItemFn, Token};

/// This macro is added before a method of `Table` in the impl block.
/// Use this macro to first check if the phase of the current round is one of
/// the phases in the attribute.
///
/// For example, `#[allowed_phase(PlayerTurn)]` will make a method first check
/// if the round is in `PlayerTurn`. If not, the method returns
/// `EngineError::InvalidAction` without touching any state.
/// `#[allowed_phase(Betting, RoundOver)]` accepts either phase.
#[proc_macro_attribute]
pub fn allowed_phase(attr: TokenStream1, item: TokenStream1) -> TokenStream1 {
    let phases = parse_macro_input!(attr with Punctuated::<Ident, Token![,]>::parse_terminated);
    let mut ast = parse_macro_input!(item as ImplItemFn);

    if phases.is_empty() {
        return syn::Error::new_spanned(&ast.sig.ident, "allowed_phase needs at least one phase")
            .to_compile_error()
            .into();
    }

    let function_name = ast.sig.ident.to_string();
    let names: Vec<String> = phases.iter().map(|phase| phase.to_string()).collect();
    let err_msg = format!(
        "{} is only allowed in {} phase",
        function_name,
        names.join(" or ")
    );

    let early_return: syn::Stmt = match syn::parse2(phase_check(&phases, &err_msg)) {
        Ok(stmt) => stmt,
        Err(err) => return err.to_compile_error().into(),
    };
    ast.block.stmts.insert(0, early_return);
    ast.into_token_stream().into()
}

fn phase_check(phases: &Punctuated<Ident, Token![,]>, err_msg: &str) -> TokenStream2 {
    let phases = phases.iter();
    quote! {
        if !matches!(self.round.phase, #(crate::table::Phase::#phases)|*) {
            return Err(crate::EngineError::InvalidAction(String::from(#err_msg)));
        }
    }
}
